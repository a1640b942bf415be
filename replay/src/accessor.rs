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

//! Decoded, per-stream access to samples.

use crate::{
    ReplayResult,
    error::Details,
    format::{BlockHeader, BlockType, SampleHeader},
    index::StreamIndex,
    stream::StreamDescription,
    time::Timestamp,
    util::{self, ByteOrder},
};
use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

/// One decoded sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub index: u64,
    pub realtime: Timestamp,
    pub logical: Timestamp,
    pub data: Vec<u8>,
}

/// Handle on one stream of an open log.
///
/// Each accessor reads through its own file handle, so several accessors (and exports) can work
/// on the same log at once. Besides random access it keeps a cursor for playback:
///
/// ```no_run
/// # use rock_replay::LogReader;
/// # fn main() -> rock_replay::ReplayResult<()> {
/// let reader = LogReader::open("run.0.log")?;
/// let mut stream = reader.open_stream("imu.acceleration")?;
/// stream.set_current_index(100);
/// for sample in stream.by_ref().take(10) {
///     let sample = sample?;
///     println!("{} {} bytes", sample.logical, sample.data.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SampleAccessor {
    description: StreamDescription,
    index: Arc<StreamIndex>,
    byte_order: ByteOrder,
    file: BufReader<File>,
    current_index: u64,
}

impl SampleAccessor {
    pub(crate) fn open(
        path: &Path,
        description: StreamDescription,
        index: Arc<StreamIndex>,
        byte_order: ByteOrder,
    ) -> ReplayResult<Self> {
        let file = File::open(path).map_err(|source| Details::OpenLog {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(SampleAccessor {
            description,
            index,
            byte_order,
            file: BufReader::new(file),
            current_index: 0,
        })
    }

    pub fn description(&self) -> &StreamDescription {
        &self.description
    }

    pub fn index(&self) -> &StreamIndex {
        &self.index
    }

    pub fn total_samples(&self) -> u64 {
        self.index.total_samples()
    }

    /// Payload of sample `sample_index`, read and checked through the block framing.
    ///
    /// Fails with a corrupt-sample error when the block around the payload does not agree with
    /// the index: short read, wrong block type or stream, or a block size that does not match
    /// the sample header.
    pub fn decoded_sample(&mut self, sample_index: u64) -> ReplayResult<Vec<u8>> {
        self.sample(sample_index).map(|sample| sample.data)
    }

    pub fn sample(&mut self, sample_index: u64) -> ReplayResult<Sample> {
        let payload_offset = self.index.offset_of(sample_index)?;
        let corrupt = |reason: String| -> crate::Error {
            Details::CorruptSample {
                index: sample_index,
                reason,
            }
            .into()
        };

        let block_offset = payload_offset
            .checked_sub(SampleHeader::SIZE + BlockHeader::SIZE)
            .ok_or_else(|| {
                corrupt(format!(
                    "payload offset {payload_offset} is inside the prologue"
                ))
            })?;
        self.file
            .seek(SeekFrom::Start(block_offset))
            .map_err(|e| corrupt(e.to_string()))?;

        let block_bytes = util::read_array(&mut self.file).map_err(|e| corrupt(e.to_string()))?;
        let block = BlockHeader::decode(block_bytes, self.byte_order, block_offset)
            .map_err(|e| corrupt(e.to_string()))?;
        if block.block_type != BlockType::Data {
            return Err(corrupt(format!("found a {} block", block.block_type)));
        }
        if block.stream_id != self.description.id() {
            return Err(corrupt(format!(
                "block belongs to stream {}, expected {}",
                block.stream_id,
                self.description.id()
            )));
        }

        let header_bytes = util::read_array(&mut self.file).map_err(|e| corrupt(e.to_string()))?;
        let header = SampleHeader::decode(header_bytes, self.byte_order);
        if u64::from(block.data_size) != SampleHeader::SIZE + u64::from(header.data_size) {
            return Err(corrupt(format!(
                "block holds {} bytes but the sample header announces {} payload bytes",
                block.data_size, header.data_size
            )));
        }

        let mut data = vec![0u8; util::safe_len(header.data_size as usize)?];
        self.file
            .read_exact(&mut data)
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Sample {
            index: sample_index,
            realtime: header.realtime(),
            logical: header.logical(),
            data,
        })
    }

    /// Move the cursor back to the first sample.
    pub fn reset(&mut self) {
        self.current_index = 0;
    }

    /// Number of the sample the next call to [`next`](Iterator::next) returns.
    pub fn current_index(&self) -> u64 {
        self.current_index
    }

    pub fn set_current_index(&mut self, sample_index: u64) {
        self.current_index = sample_index;
    }

    /// Move the cursor `step` samples forward, stopping at the end of the stream.
    pub fn advance(&mut self, step: u64) {
        self.current_index = self
            .current_index
            .saturating_add(step)
            .min(self.total_samples());
    }
}

impl Iterator for SampleAccessor {
    type Item = ReplayResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.total_samples() {
            return None;
        }
        let sample = self.sample(self.current_index);
        self.current_index += 1;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reader::LogReader, stream::StreamType, writer::LogWriter};
    use pretty_assertions::assert_eq;
    use replay_test_helper::TestResult;
    use std::path::PathBuf;

    fn write_log(dir: &Path) -> ReplayResult<PathBuf> {
        let path = dir.join("stream.log");
        let file = std::io::BufWriter::new(File::create(&path).map_err(Details::WriteBytes)?);
        let mut writer = LogWriter::builder()
            .writer(file)
            .byte_order(ByteOrder::Little)
            .build();
        writer.write_stream_declaration(0, StreamType::Data, "gps.position", "/vec", "", &[])?;
        writer.write_stream_declaration(1, StreamType::Data, "gps.time", "/time", "", &[])?;
        for i in 0..5u8 {
            let t = Timestamp::new(i32::from(i), 0);
            writer.write_sample(0, t, t, &vec![i; usize::from(i) + 1])?;
            writer.write_sample(1, t, t, &[0xAA])?;
        }
        writer.into_inner()?;
        Ok(path)
    }

    #[test]
    fn test_decoded_sample() -> TestResult {
        let dir = tempfile::tempdir()?;
        let reader = LogReader::open(write_log(dir.path())?)?;
        let mut stream = reader.open_stream("gps.position")?;

        assert_eq!(stream.total_samples(), 5);
        assert_eq!(stream.decoded_sample(3)?, vec![3, 3, 3, 3]);
        let sample = stream.sample(4)?;
        assert_eq!(sample.logical, Timestamp::new(4, 0));
        assert_eq!(sample.data.len(), 5);

        assert!(matches!(
            stream.decoded_sample(5).map_err(crate::Error::into_details),
            Err(Details::SampleOutOfRange { index: 5, total: 5 })
        ));

        Ok(())
    }

    #[test]
    fn test_cursor() -> TestResult {
        let dir = tempfile::tempdir()?;
        let reader = LogReader::open(write_log(dir.path())?)?;
        let mut stream = reader.open_stream("gps.position")?;

        let first_two: Vec<u64> = stream
            .by_ref()
            .take(2)
            .map(|s| s.map(|s| s.index))
            .collect::<ReplayResult<_>>()?;
        assert_eq!(first_two, vec![0, 1]);
        assert_eq!(stream.current_index(), 2);

        stream.advance(10);
        assert_eq!(stream.current_index(), 5);
        assert!(stream.next().is_none());

        stream.reset();
        assert_eq!(stream.next().transpose()?.map(|s| s.index), Some(0));

        stream.set_current_index(4);
        assert_eq!(stream.count(), 1);

        Ok(())
    }

    #[test]
    fn test_corrupt_block_size() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = write_log(dir.path())?;
        let reader = LogReader::open(&path)?;
        let payload_offset = reader.stream_index("gps.position")?.offset_of(2)?;

        // shrink the announced payload of sample 2 by one byte (little-endian low byte)
        let mut bytes = std::fs::read(&path)?;
        let size_at = (payload_offset - 4) as usize;
        bytes[size_at] -= 1;
        std::fs::write(&path, &bytes)?;

        let mut stream = reader.open_stream("gps.position")?;
        assert!(stream.decoded_sample(2).unwrap_err().is_corrupt_sample());
        assert_eq!(stream.decoded_sample(1)?, vec![1, 1]);

        Ok(())
    }
}
