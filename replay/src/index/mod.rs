// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Random access to the samples of one stream.

pub(crate) mod cache;

use crate::{ReplayResult, error::Details, time::Timestamp};

/// Where one sample lives in the log file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset of the first payload byte. The sample header ends right there.
    pub payload_offset: u64,
    pub logical_time: Timestamp,
}

/// Maps the 0-based sample number of one stream to its position in the file.
///
/// Entries follow file order, so payload offsets are strictly increasing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamIndex {
    stream_id: u16,
    entries: Vec<IndexEntry>,
    time_monotonic: bool,
}

impl StreamIndex {
    pub fn new(stream_id: u16) -> Self {
        StreamIndex {
            stream_id,
            entries: Vec::new(),
            time_monotonic: true,
        }
    }

    pub fn from_entries(stream_id: u16, entries: Vec<IndexEntry>) -> Self {
        let mut index = StreamIndex::new(stream_id);
        for entry in entries {
            index.push(entry);
        }
        index
    }

    pub(crate) fn push(&mut self, entry: IndexEntry) {
        debug_assert!(
            self.entries
                .last()
                .is_none_or(|last| last.payload_offset < entry.payload_offset),
            "index entries must follow file order"
        );
        if let Some(last) = self.entries.last() {
            self.time_monotonic &= last.logical_time <= entry.logical_time;
        }
        self.entries.push(entry);
    }

    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    pub fn total_samples(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, sample_index: u64) -> ReplayResult<IndexEntry> {
        usize::try_from(sample_index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .copied()
            .ok_or_else(|| {
                Details::SampleOutOfRange {
                    index: sample_index,
                    total: self.total_samples(),
                }
                .into()
            })
    }

    /// Offset of the payload of sample `sample_index`.
    pub fn offset_of(&self, sample_index: u64) -> ReplayResult<u64> {
        self.entry(sample_index).map(|entry| entry.payload_offset)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// `(sample index, entry)` pairs in stream order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &IndexEntry)> + '_ {
        (0u64..).zip(self.entries.iter())
    }

    /// First and last logical time of the stream.
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.entries.first()?;
        let last = self.entries.last()?;
        Some((first.logical_time, last.logical_time))
    }

    /// Number of the first sample whose logical time is at or after `time`.
    pub fn index_at_or_after(&self, time: Timestamp) -> Option<u64> {
        let position = if self.time_monotonic {
            self.entries.partition_point(|entry| entry.logical_time < time)
        } else {
            self.entries
                .iter()
                .position(|entry| entry.logical_time >= time)?
        };
        (position < self.entries.len()).then_some(position as u64)
    }
}
