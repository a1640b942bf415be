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

//! Copying a range of samples of one stream into a new log.

use crate::{
    ReplayResult,
    error::Details,
    format::SampleHeader,
    reader::LogReader,
    util::{self, ByteOrder},
    writer::LogWriter,
};
use log::debug;
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom},
    ops::ControlFlow,
    path::{Path, PathBuf},
};

/// Id of the only stream of an exported log.
pub const EXPORTED_STREAM_ID: u16 = 0;

/// What to export, and where.
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct ExportRequest {
    #[builder(into)]
    pub stream_name: String,
    pub start_index: u64,
    /// Exclusive.
    pub end_index: u64,
    #[builder(into)]
    pub destination: PathBuf,
}

/// Copy samples `[start_index, end_index)` of the data stream `stream_name` of `reader` into a
/// new log at `destination`, returning the number of samples written.
///
/// The new log uses the byte order of the source and holds a single stream, declared with id
/// [`EXPORTED_STREAM_ID`] and the name, type and metadata (sorted by key) of the source stream.
/// Payloads and timestamps are copied verbatim from the source blocks. A sample the decoding
/// path rejects as corrupt is skipped and not counted.
///
/// After every sample, written or skipped, `on_progress` receives its index and then
/// `is_cancelled` is asked whether to go on. Returning [`ControlFlow::Break`] or `true` stops
/// the export; the samples written so far stay in the destination.
///
/// `end_index` is not clamped to the length of the stream: an index past the end fails with
/// an out-of-range error once the samples before it have been written. Any error leaves a
/// partial destination file behind.
pub fn export_range<P, C>(
    reader: &LogReader,
    stream_name: &str,
    start_index: u64,
    end_index: u64,
    destination: &Path,
    mut on_progress: P,
    mut is_cancelled: C,
) -> ReplayResult<u64>
where
    P: FnMut(u64) -> ControlFlow<()>,
    C: FnMut() -> bool,
{
    if start_index > end_index {
        return Err(Details::InvalidRange {
            start: start_index,
            end: end_index,
        }
        .into());
    }
    let description = reader.stream_description(stream_name)?;
    let index = reader.index_of(&description);
    let mut accessor = reader.accessor_for(description.clone())?;

    let file = File::create(destination).map_err(|source| Details::CreateDestination {
        path: destination.to_path_buf(),
        source,
    })?;
    let mut writer = LogWriter::builder()
        .writer(BufWriter::new(file))
        .byte_order(reader.byte_order())
        .build();
    writer.write_stream_declaration(
        EXPORTED_STREAM_ID,
        description.stream_type(),
        description.name(),
        description.type_name(),
        description.type_description(),
        &description.sorted_metadata(),
    )?;

    let mut raw = RawSamples::open(reader.path(), reader.byte_order())?;
    debug!(
        "Exporting samples {start_index}..{end_index} of {stream_name} to {destination:?}"
    );

    let mut written = 0u64;
    for sample_index in start_index..end_index {
        let payload_offset = index.offset_of(sample_index)?;
        let (header, payload) = raw.read(sample_index, payload_offset)?;

        match accessor.decoded_sample(sample_index) {
            Ok(_) => {
                writer.write_sample(
                    EXPORTED_STREAM_ID,
                    header.realtime(),
                    header.logical(),
                    &payload,
                )?;
                written += 1;
            }
            Err(e) if e.is_corrupt_sample() => debug!("Skipping sample: {e}"),
            Err(e) => return Err(e),
        }

        if on_progress(sample_index).is_break() {
            debug!("Export stopped by its progress callback after sample {sample_index}");
            break;
        }
        if is_cancelled() {
            debug!("Export cancelled after sample {sample_index}");
            break;
        }
    }

    writer.into_inner()?;
    debug!("Exported {written} samples of {stream_name} to {destination:?}");
    Ok(written)
}

/// Reads sample blocks of the source verbatim.
///
/// Keeps track of the file position so that moving to the next sample is a relative seek,
/// which leaves the buffer intact when the sample is already in it.
struct RawSamples {
    reader: BufReader<File>,
    /// `None` after a failed read, when the position is unknown.
    position: Option<u64>,
    order: ByteOrder,
}

impl RawSamples {
    fn open(path: &Path, order: ByteOrder) -> ReplayResult<Self> {
        let file = File::open(path).map_err(|source| Details::OpenLog {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(RawSamples {
            reader: BufReader::new(file),
            position: Some(0),
            order,
        })
    }

    /// Header and payload of the sample whose payload starts at `payload_offset`.
    fn read(
        &mut self,
        sample_index: u64,
        payload_offset: u64,
    ) -> ReplayResult<(SampleHeader, Vec<u8>)> {
        let header_error = |source| Details::ReadSampleHeader {
            index: sample_index,
            source,
        };
        let header_offset = payload_offset.checked_sub(SampleHeader::SIZE).ok_or_else(|| {
            header_error(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload offset {payload_offset} leaves no room for a sample header"),
            ))
        })?;
        self.seek_to(header_offset).map_err(header_error)?;
        self.position = None;
        let header = SampleHeader::decode(
            util::read_array(&mut self.reader).map_err(header_error)?,
            self.order,
        );

        let mut payload = vec![0u8; util::safe_len(header.data_size as usize)?];
        self.reader
            .read_exact(&mut payload)
            .map_err(|source| Details::ReadSamplePayload {
                index: sample_index,
                source,
            })?;
        self.position = Some(payload_offset + payload.len() as u64);

        Ok((header, payload))
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        let delta = self
            .position
            .take()
            .and_then(|position| i64::try_from(i128::from(offset) - i128::from(position)).ok());
        match delta {
            Some(0) => Ok(()),
            Some(delta) => self.reader.seek_relative(delta),
            None => self.reader.seek(SeekFrom::Start(offset)).map(drop),
        }?;
        self.position = Some(offset);
        Ok(())
    }
}

/// `<dir>/<stem>-<start>-<end>.log`, with both indexes zero-padded to six digits.
///
/// ```
/// # use rock_replay::default_export_path;
/// # use std::path::{Path, PathBuf};
/// assert_eq!(
///     default_export_path(Path::new("/logs/run.0.log"), 100, 200),
///     PathBuf::from("/logs/run.0-000100-000200.log")
/// );
/// ```
pub fn default_export_path(source: &Path, start_index: u64, end_index: u64) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    let name = format!("{stem}-{start_index:06}-{end_index:06}.log");
    match source.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        stream::{StreamMetadata, StreamType},
        time::Timestamp,
    };
    use pretty_assertions::assert_eq;
    use replay_test_helper::{
        TestResult,
        logger::{assert_logged, clear_log_messages},
    };
    use rstest::rstest;

    fn write_source(path: &Path, samples: u8) -> ReplayResult<()> {
        let file = File::create(path).map_err(Details::WriteBytes)?;
        let mut writer = LogWriter::builder()
            .writer(BufWriter::new(file))
            .byte_order(ByteOrder::Little)
            .build();
        writer.write_stream_declaration(
            4,
            StreamType::Data,
            "dvl.velocity",
            "/base/Vector3d",
            "struct Vector3d",
            &[
                StreamMetadata::new("rock_task_name", "dvl"),
                StreamMetadata::new("rock_cxx_type_name", "Eigen::Vector3d"),
            ],
        )?;
        for i in 0..samples {
            let t = Timestamp::new(10, i32::from(i));
            writer.write_sample(4, t, t, &[i, i, i])?;
        }
        writer.into_inner()?;
        Ok(())
    }

    #[rstest]
    #[case("/logs/run.0.log", 0, 12, "/logs/run.0-000000-000012.log")]
    #[case("dive.log", 5, 1234567, "dive-000005-1234567.log")]
    #[case("/logs/noext", 1, 2, "/logs/noext-000001-000002.log")]
    fn test_default_export_path(
        #[case] source: &str,
        #[case] start: u64,
        #[case] end: u64,
        #[case] expected: &str,
    ) {
        assert_eq!(
            default_export_path(Path::new(source), start, end),
            PathBuf::from(expected)
        );
    }

    #[test]
    fn test_export_copies_declaration_and_samples() -> TestResult {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dvl.log");
        let destination = dir.path().join("dvl-part.log");
        write_source(&source, 10)?;

        let reader = LogReader::open(&source)?;
        let written = export_range(
            &reader,
            "dvl.velocity",
            2,
            6,
            &destination,
            |_| ControlFlow::Continue(()),
            || false,
        )?;
        assert_eq!(written, 4);

        let exported = LogReader::open(&destination)?;
        let streams = exported.list_data_streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].id(), EXPORTED_STREAM_ID);
        assert_eq!(streams[0].type_description(), "struct Vector3d");
        assert_eq!(
            streams[0].metadata(),
            &[
                StreamMetadata::new("rock_cxx_type_name", "Eigen::Vector3d"),
                StreamMetadata::new("rock_task_name", "dvl"),
            ]
        );

        let mut stream = exported.open_stream("dvl.velocity")?;
        let first = stream.sample(0)?;
        assert_eq!(first.data, vec![2, 2, 2]);
        assert_eq!(first.logical, Timestamp::new(10, 2));
        assert_eq!(stream.decoded_sample(3)?, vec![5, 5, 5]);

        Ok(())
    }

    #[test]
    fn test_invalid_range_touches_nothing() -> TestResult {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dvl.log");
        let destination = dir.path().join("reversed.log");
        write_source(&source, 3)?;

        let reader = LogReader::open(&source)?;
        let result = export_range(
            &reader,
            "dvl.velocity",
            2,
            1,
            &destination,
            |_| ControlFlow::Continue(()),
            || false,
        );
        assert!(matches!(
            result.map_err(crate::Error::into_details),
            Err(Details::InvalidRange { start: 2, end: 1 })
        ));
        assert!(!destination.exists());

        Ok(())
    }

    #[test]
    fn test_progress_break_stops_after_current_sample() -> TestResult {
        replay_test_helper::init();
        clear_log_messages();
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dvl.log");
        let destination = dir.path().join("stopped.log");
        write_source(&source, 10)?;

        let reader = LogReader::open(&source)?;
        let mut seen = Vec::new();
        let written = export_range(
            &reader,
            "dvl.velocity",
            0,
            10,
            &destination,
            |i| {
                seen.push(i);
                if i == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
            || false,
        )?;
        assert_eq!(written, 4);
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_logged("Export stopped by its progress callback after sample 3");

        Ok(())
    }

    #[test]
    fn test_raw_samples_in_any_order() -> TestResult {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dvl.log");
        write_source(&source, 10)?;
        let reader = LogReader::open(&source)?;
        let index = reader.stream_index("dvl.velocity")?;

        let mut raw = RawSamples::open(&source, ByteOrder::Little)?;
        for sample_index in [0, 1, 7, 7, 3, 9, 0] {
            let (header, payload) = raw.read(sample_index, index.offset_of(sample_index)?)?;
            let i = sample_index as u8;
            assert_eq!(payload, vec![i, i, i]);
            assert_eq!(header.logical(), Timestamp::new(10, i32::from(i)));
        }

        Ok(())
    }

    #[test]
    fn test_raw_samples_recover_after_failed_read() -> TestResult {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("dvl.log");
        write_source(&source, 4)?;
        let reader = LogReader::open(&source)?;
        let index = reader.stream_index("dvl.velocity")?;

        let mut raw = RawSamples::open(&source, ByteOrder::Little)?;
        assert!(matches!(
            raw.read(0, 3).map_err(crate::Error::into_details),
            Err(Details::ReadSampleHeader { index: 0, .. })
        ));
        assert!(matches!(
            raw.read(1, u64::MAX / 2).map_err(crate::Error::into_details),
            Err(Details::ReadSampleHeader { index: 1, .. })
        ));
        let (_, payload) = raw.read(2, index.offset_of(2)?)?;
        assert_eq!(payload, vec![2, 2, 2]);

        Ok(())
    }
}
