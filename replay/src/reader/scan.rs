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

use crate::{
    ReplayResult,
    error::Details,
    format::{BlockHeader, BlockType, Prologue, SampleHeader, decode_stream_declaration},
    index::{IndexEntry, StreamIndex, cache::CachedStream},
    stream::StreamDescription,
    util::{self, ByteOrder},
};
use log::warn;
use std::{
    collections::HashMap,
    io::{BufReader, Read, Seek, SeekFrom},
};

/// One declared stream with the samples found for it.
#[derive(Debug)]
pub(crate) struct ScannedStream {
    pub(crate) description: StreamDescription,
    /// Offset of the `Stream` block that declared it.
    pub(crate) declaration_offset: u64,
    pub(crate) index: StreamIndex,
}

/// Walk every block after the prologue, collecting stream declarations and sample positions.
///
/// `reader` must be positioned right after the prologue, `source_len` is the file length.
pub(crate) fn scan_blocks<R: Read + Seek>(
    reader: &mut BufReader<R>,
    order: ByteOrder,
    source_len: u64,
) -> ReplayResult<Vec<ScannedStream>> {
    let mut streams: Vec<ScannedStream> = Vec::new();
    let mut positions: HashMap<u16, usize> = HashMap::new();
    let mut offset = Prologue::SIZE;

    while offset < source_len {
        if source_len - offset < BlockHeader::SIZE {
            warn!("Ignoring truncated block header at offset {offset}");
            break;
        }
        let header_bytes = util::read_array(reader)
            .map_err(|source| Details::ReadBlockHeader { offset, source })?;
        let header = BlockHeader::decode(header_bytes, order, offset)?;
        let body_offset = offset + BlockHeader::SIZE;
        let block_end = body_offset + u64::from(header.data_size);
        if block_end > source_len {
            warn!(
                "Ignoring truncated {} block at offset {offset}",
                header.block_type
            );
            break;
        }

        let mut consumed = 0u64;
        match header.block_type {
            BlockType::Stream => {
                let body = read_body(reader, header.data_size, offset)?;
                consumed = body.len() as u64;
                let description =
                    decode_stream_declaration(header.stream_id, &body, order, offset)?;
                if positions.contains_key(&header.stream_id) {
                    return Err(Details::DuplicateStream(header.stream_id).into());
                }
                positions.insert(header.stream_id, streams.len());
                streams.push(ScannedStream {
                    description,
                    declaration_offset: offset,
                    index: StreamIndex::new(header.stream_id),
                });
            }
            BlockType::Data => match positions.get(&header.stream_id) {
                None => warn!(
                    "Ignoring sample of undeclared stream {} at offset {offset}",
                    header.stream_id
                ),
                Some(_) if u64::from(header.data_size) < SampleHeader::SIZE => warn!(
                    "Ignoring data block too short for a sample header at offset {offset}"
                ),
                Some(&position) => {
                    let sample_bytes = util::read_array(reader).map_err(|source| {
                        Details::ReadBlockHeader {
                            offset: body_offset,
                            source,
                        }
                    })?;
                    consumed = SampleHeader::SIZE;
                    let sample = SampleHeader::decode(sample_bytes, order);
                    streams[position].index.push(IndexEntry {
                        payload_offset: body_offset + SampleHeader::SIZE,
                        logical_time: sample.logical(),
                    });
                }
            },
            BlockType::Control => {}
        }

        let remaining = u64::from(header.data_size) - consumed;
        reader
            .seek_relative(remaining as i64)
            .map_err(|source| Details::ReadBlockHeader {
                offset: block_end,
                source,
            })?;
        offset = block_end;
    }

    Ok(streams)
}

/// Rebuild the scan result from a cached index, reading only the stream declarations.
pub(crate) fn from_cache<R: Read + Seek>(
    reader: &mut BufReader<R>,
    order: ByteOrder,
    cached: Vec<CachedStream>,
) -> ReplayResult<Vec<ScannedStream>> {
    cached
        .into_iter()
        .map(|stream| {
            let description = read_declaration_at(reader, order, stream.declaration_offset)?;
            if description.id() != stream.index.stream_id() {
                return Err(Details::MalformedStreamDeclaration {
                    offset: stream.declaration_offset,
                    reason: format!(
                        "declares stream {}, the index expected stream {}",
                        description.id(),
                        stream.index.stream_id()
                    ),
                }
                .into());
            }
            Ok(ScannedStream {
                description,
                declaration_offset: stream.declaration_offset,
                index: stream.index,
            })
        })
        .collect()
}

fn read_declaration_at<R: Read + Seek>(
    reader: &mut BufReader<R>,
    order: ByteOrder,
    offset: u64,
) -> ReplayResult<StreamDescription> {
    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|source| Details::ReadBlockHeader { offset, source })?;
    let header_bytes =
        util::read_array(reader).map_err(|source| Details::ReadBlockHeader { offset, source })?;
    let header = BlockHeader::decode(header_bytes, order, offset)?;
    if header.block_type != BlockType::Stream {
        return Err(Details::MalformedStreamDeclaration {
            offset,
            reason: format!("expected a stream block, found a {} block", header.block_type),
        }
        .into());
    }
    let body = read_body(reader, header.data_size, offset)?;
    decode_stream_declaration(header.stream_id, &body, order, offset)
}

fn read_body<R: Read>(reader: &mut R, data_size: u32, offset: u64) -> ReplayResult<Vec<u8>> {
    let mut body = vec![0u8; util::safe_len(data_size as usize)?];
    reader
        .read_exact(&mut body)
        .map_err(|source| Details::ReadStreamDeclaration { offset, source })?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        format::encode_stream_declaration, stream::StreamType, time::Timestamp, writer::LogWriter,
    };
    use pretty_assertions::assert_eq;
    use replay_test_helper::{
        TestResult,
        logger::{assert_logged, clear_log_messages},
    };
    use std::io::Cursor;

    fn scan(bytes: Vec<u8>) -> ReplayResult<Vec<ScannedStream>> {
        let len = bytes.len() as u64;
        let mut reader = BufReader::new(Cursor::new(bytes));
        let prologue = Prologue::read(&mut reader)?;
        scan_blocks(&mut reader, prologue.byte_order, len)
    }

    fn two_stream_log(order: ByteOrder) -> ReplayResult<Vec<u8>> {
        let mut writer = LogWriter::builder()
            .writer(Vec::new())
            .byte_order(order)
            .build();
        writer.write_stream_declaration(0, StreamType::Data, "a.x", "/int", "", &[])?;
        writer.write_stream_declaration(5, StreamType::Control, "a.ctl", "/int", "", &[])?;
        for i in 0..3 {
            let t = Timestamp::new(i, 0);
            writer.write_sample(0, t, t, &[i as u8; 4])?;
            writer.write_control(5, b"tick")?;
        }
        writer.into_inner()
    }

    #[test]
    fn test_scan_streams_and_samples() -> TestResult {
        let streams = scan(two_stream_log(ByteOrder::Little)?)?;
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].description.name(), "a.x");
        assert_eq!(streams[0].declaration_offset, Prologue::SIZE);
        assert_eq!(streams[0].index.total_samples(), 3);
        assert_eq!(streams[1].description.stream_type(), StreamType::Control);
        assert_eq!(streams[1].index.total_samples(), 0);

        let offsets: Vec<u64> = streams[0]
            .index
            .entries()
            .iter()
            .map(|e| e.payload_offset)
            .collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));

        Ok(())
    }

    #[test]
    fn test_scan_big_endian() -> TestResult {
        let streams = scan(two_stream_log(ByteOrder::Big)?)?;
        assert_eq!(streams[0].index.total_samples(), 3);
        assert_eq!(
            streams[0].index.entry(2)?.logical_time,
            Timestamp::new(2, 0)
        );

        Ok(())
    }

    #[test]
    fn test_scan_ignores_truncated_tail() -> TestResult {
        replay_test_helper::init();
        clear_log_messages();

        let mut bytes = two_stream_log(ByteOrder::Little)?;
        // drop the last control block entirely and half of the sample before it
        bytes.truncate(bytes.len() - (BlockHeader::SIZE as usize + 4) - 6);
        let streams = scan(bytes)?;
        assert_eq!(streams[0].index.total_samples(), 2);
        assert!(
            replay_test_helper::logger::log_messages()
                .iter()
                .any(|m| m.starts_with("Ignoring truncated Data block at offset"))
        );

        Ok(())
    }

    #[test]
    fn test_scan_skips_undeclared_samples() -> TestResult {
        replay_test_helper::init();
        clear_log_messages();

        let mut bytes = Prologue::new(ByteOrder::Little).encode().to_vec();
        let header = BlockHeader {
            block_type: BlockType::Data,
            stream_id: 9,
            data_size: SampleHeader::SIZE as u32,
        };
        bytes.extend_from_slice(&header.encode(ByteOrder::Little));
        bytes.extend_from_slice(&SampleHeader::default().encode(ByteOrder::Little));

        let streams = scan(bytes)?;
        assert!(streams.is_empty());
        assert_logged("Ignoring sample of undeclared stream 9 at offset 15");

        Ok(())
    }

    #[test]
    fn test_scan_rejects_duplicate_declaration() -> TestResult {
        let mut bytes = Prologue::new(ByteOrder::Little).encode().to_vec();
        let body =
            encode_stream_declaration(ByteOrder::Little, StreamType::Data, "a", "t", "", &[])?;
        for _ in 0..2 {
            let header = BlockHeader {
                block_type: BlockType::Stream,
                stream_id: 1,
                data_size: body.len() as u32,
            };
            bytes.extend_from_slice(&header.encode(ByteOrder::Little));
            bytes.extend_from_slice(&body);
        }

        assert!(matches!(
            scan(bytes).map_err(crate::Error::into_details),
            Err(Details::DuplicateStream(1))
        ));

        Ok(())
    }
}
