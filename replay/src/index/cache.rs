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

//! Sidecar file persisting the sample indexes of a log, so reopening a large log does not
//! require walking all of its blocks again.
//!
//! Layout, all little-endian: magic, version, length and modification time of the indexed log,
//! stream count, then for each stream its id, the offset of its declaration block, the sample
//! count and one `(payload offset, logical time in microseconds)` pair per sample.

use super::{IndexEntry, StreamIndex};
use crate::{ReplayResult, error::Details, time::Timestamp, util::array_at};
use log::debug;
use std::{
    ffi::OsString,
    fs::{File, Metadata},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

const CACHE_MAGIC: &[u8; 7] = b"RPLYIDX";
const CACHE_VERSION: u32 = 2;
const HEADER_SIZE: usize = 7 + 4 + 8 + 8 + 4;
const STREAM_HEADER_SIZE: usize = 2 + 8 + 8;
const ENTRY_SIZE: usize = 8 + 8;

/// What the cache remembers of the log it indexes. A log that differs in either field has
/// changed since the cache was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SourceStamp {
    pub(crate) len: u64,
    /// Microseconds since the Unix epoch, 0 where the platform does not report it.
    pub(crate) modified_micros: u64,
}

impl SourceStamp {
    pub(crate) fn of(metadata: &Metadata) -> Self {
        let modified_micros = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .and_then(|since_epoch| u64::try_from(since_epoch.as_micros()).ok())
            .unwrap_or(0);
        SourceStamp {
            len: metadata.len(),
            modified_micros,
        }
    }
}

/// A stream as remembered by the cache.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CachedStream {
    pub(crate) declaration_offset: u64,
    pub(crate) index: StreamIndex,
}

/// `<log path>.idx`
pub(crate) fn cache_path(log_path: &Path) -> PathBuf {
    let mut name = OsString::from(log_path.as_os_str());
    name.push(".idx");
    PathBuf::from(name)
}

/// Load the cache at `path` if it describes the log stamped `source`.
///
/// A missing or stale cache is `Ok(None)`; an unreadable or inconsistent one is an error.
pub(crate) fn load(path: &Path, source: SourceStamp) -> ReplayResult<Option<Vec<CachedStream>>> {
    if !path.exists() {
        return Ok(None);
    }
    let invalid = |reason: String| Details::IndexCache {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
    if bytes.len() < HEADER_SIZE || &bytes[..7] != CACHE_MAGIC {
        return Err(invalid("wrong magic".to_string()).into());
    }
    let version = u32::from_le_bytes(array_at(&bytes, 7));
    if version != CACHE_VERSION {
        return Err(invalid(format!("unsupported version {version}")).into());
    }
    let indexed = SourceStamp {
        len: u64::from_le_bytes(array_at(&bytes, 11)),
        modified_micros: u64::from_le_bytes(array_at(&bytes, 19)),
    };
    if indexed != source {
        debug!("Index cache {path:?} is stale: it indexes {indexed:?}, the log is {source:?}");
        return Ok(None);
    }
    let stream_count = u32::from_le_bytes(array_at(&bytes, 27));

    let mut at = HEADER_SIZE;
    let mut streams = Vec::new();
    for _ in 0..stream_count {
        if bytes.len() - at < STREAM_HEADER_SIZE {
            return Err(invalid("truncated stream entry".to_string()).into());
        }
        let stream_id = u16::from_le_bytes(array_at(&bytes, at));
        let declaration_offset = u64::from_le_bytes(array_at(&bytes, at + 2));
        let count = u64::from_le_bytes(array_at(&bytes, at + 10));
        at += STREAM_HEADER_SIZE;

        let available = ((bytes.len() - at) / ENTRY_SIZE) as u64;
        if count > available {
            return Err(invalid(format!(
                "stream {stream_id} claims {count} samples, only {available} stored"
            ))
            .into());
        }
        let mut index = StreamIndex::new(stream_id);
        let mut previous_offset = None;
        for sample_index in 0..count {
            let payload_offset = u64::from_le_bytes(array_at(&bytes, at));
            if payload_offset >= source.len {
                return Err(invalid(format!(
                    "sample {sample_index} of stream {stream_id} lies past the end of the log"
                ))
                .into());
            }
            if previous_offset.is_some_and(|previous| previous >= payload_offset) {
                return Err(invalid(format!(
                    "samples of stream {stream_id} are out of file order at sample {sample_index}"
                ))
                .into());
            }
            previous_offset = Some(payload_offset);
            index.push(IndexEntry {
                payload_offset,
                logical_time: Timestamp::from_micros(i64::from_le_bytes(array_at(&bytes, at + 8))),
            });
            at += ENTRY_SIZE;
        }
        streams.push(CachedStream {
            declaration_offset,
            index,
        });
    }
    if at != bytes.len() {
        return Err(invalid(format!("{} trailing bytes", bytes.len() - at)).into());
    }

    Ok(Some(streams))
}

/// Write the cache for the log stamped `source`.
pub(crate) fn store<'a, I>(path: &Path, source: SourceStamp, streams: I) -> ReplayResult<()>
where
    I: ExactSizeIterator<Item = (u64, &'a StreamIndex)>,
{
    let failed = |e: std::io::Error| Details::IndexCache {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut out = BufWriter::new(File::create(path).map_err(failed)?);
    let stream_count = u32::try_from(streams.len()).map_err(|_| Details::IndexCache {
        path: path.to_path_buf(),
        reason: "too many streams".to_string(),
    })?;

    out.write_all(CACHE_MAGIC).map_err(failed)?;
    out.write_all(&CACHE_VERSION.to_le_bytes()).map_err(failed)?;
    out.write_all(&source.len.to_le_bytes()).map_err(failed)?;
    out.write_all(&source.modified_micros.to_le_bytes())
        .map_err(failed)?;
    out.write_all(&stream_count.to_le_bytes()).map_err(failed)?;
    for (declaration_offset, index) in streams {
        out.write_all(&index.stream_id().to_le_bytes())
            .map_err(failed)?;
        out.write_all(&declaration_offset.to_le_bytes())
            .map_err(failed)?;
        out.write_all(&index.total_samples().to_le_bytes())
            .map_err(failed)?;
        for entry in index.entries() {
            out.write_all(&entry.payload_offset.to_le_bytes())
                .map_err(failed)?;
            out.write_all(&entry.logical_time.as_micros().to_le_bytes())
                .map_err(failed)?;
        }
    }
    out.flush().map_err(failed)?;
    Ok(())
}
