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

//! Binary layout of the log container.
//!
//! A log starts with a [`Prologue`] and continues with blocks until the end of the file. Each
//! block starts with a [`BlockHeader`] telling what follows:
//!
//! | block         | body                                                      |
//! |---------------|-----------------------------------------------------------|
//! | `Stream`      | stream type, name, type name, type schema, metadata pairs |
//! | `Data`        | [`SampleHeader`] followed by the sample payload           |
//! | `Control`     | opaque bytes                                              |
//!
//! The prologue is always little-endian. Everything after it uses the byte order declared by the
//! prologue flags.

use crate::{
    ReplayResult,
    error::Details,
    stream::{StreamDescription, StreamMetadata, StreamType},
    time::Timestamp,
    util::{self, ByteOrder, array_at},
};
use std::io::Read;

pub const MAGIC: &[u8; 7] = b"POCOSIM";
pub const FORMAT_VERSION: u32 = 2;
const BIG_ENDIAN_FLAG: u32 = 0x1;

/// Start of the file, before any block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prologue {
    pub version: u32,
    pub byte_order: ByteOrder,
}

impl Prologue {
    pub const SIZE: u64 = 15;

    pub fn new(byte_order: ByteOrder) -> Self {
        Prologue {
            version: FORMAT_VERSION,
            byte_order,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE as usize] {
        let flags = match self.byte_order {
            ByteOrder::Little => 0,
            ByteOrder::Big => BIG_ENDIAN_FLAG,
        };
        let mut out = [0u8; Self::SIZE as usize];
        out[..7].copy_from_slice(MAGIC);
        out[7..11].copy_from_slice(&self.version.to_le_bytes());
        out[11..15].copy_from_slice(&flags.to_le_bytes());
        out
    }

    pub fn read<R: Read>(reader: &mut R) -> ReplayResult<Self> {
        let buf: [u8; Self::SIZE as usize] =
            util::read_array(reader).map_err(Details::ReadPrologue)?;
        if &buf[..7] != MAGIC {
            return Err(Details::PrologueMagic.into());
        }
        let version = u32::from_le_bytes(array_at(&buf, 7));
        if version != FORMAT_VERSION {
            return Err(Details::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        let flags = u32::from_le_bytes(array_at(&buf, 11));
        let byte_order = if flags & BIG_ENDIAN_FLAG != 0 {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        };
        Ok(Prologue {
            version,
            byte_order,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::FromRepr, strum_macros::Display)]
#[repr(u8)]
pub enum BlockType {
    Stream = 1,
    Data = 2,
    Control = 3,
}

/// Framing of every block: what it is, which stream it belongs to, and how long its body is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_type: BlockType,
    pub stream_id: u16,
    /// Number of body bytes following the header.
    pub data_size: u32,
}

impl BlockHeader {
    pub const SIZE: u64 = 8;

    pub fn encode(&self, order: ByteOrder) -> [u8; Self::SIZE as usize] {
        let mut out = [0u8; Self::SIZE as usize];
        out[0] = self.block_type as u8;
        // out[1] is padding
        out[2..4].copy_from_slice(&order.u16_bytes(self.stream_id));
        out[4..8].copy_from_slice(&order.u32_bytes(self.data_size));
        out
    }

    /// `offset` is where the header was read from, for error reporting.
    pub fn decode(
        bytes: [u8; Self::SIZE as usize],
        order: ByteOrder,
        offset: u64,
    ) -> ReplayResult<Self> {
        let block_type =
            BlockType::from_repr(bytes[0]).ok_or(Details::UnknownBlockType {
                block_type: bytes[0],
                offset,
            })?;
        Ok(BlockHeader {
            block_type,
            stream_id: order.read_u16(array_at(&bytes, 2)),
            data_size: order.read_u32(array_at(&bytes, 4)),
        })
    }
}

/// Fixed-size record sitting right before each sample payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleHeader {
    pub realtime_seconds: i32,
    pub realtime_micros: i32,
    pub logical_seconds: i32,
    pub logical_micros: i32,
    /// Number of payload bytes following the header.
    pub data_size: u32,
}

impl SampleHeader {
    pub const SIZE: u64 = 20;

    pub fn new(realtime: Timestamp, logical: Timestamp, data_size: u32) -> Self {
        SampleHeader {
            realtime_seconds: realtime.seconds,
            realtime_micros: realtime.micros,
            logical_seconds: logical.seconds,
            logical_micros: logical.micros,
            data_size,
        }
    }

    /// Wall-clock time the sample was logged at.
    pub fn realtime(&self) -> Timestamp {
        Timestamp::new(self.realtime_seconds, self.realtime_micros)
    }

    /// Time the sample refers to, as stamped by its producer.
    pub fn logical(&self) -> Timestamp {
        Timestamp::new(self.logical_seconds, self.logical_micros)
    }

    pub fn encode(&self, order: ByteOrder) -> [u8; Self::SIZE as usize] {
        let mut out = [0u8; Self::SIZE as usize];
        out[0..4].copy_from_slice(&order.i32_bytes(self.realtime_seconds));
        out[4..8].copy_from_slice(&order.i32_bytes(self.realtime_micros));
        out[8..12].copy_from_slice(&order.i32_bytes(self.logical_seconds));
        out[12..16].copy_from_slice(&order.i32_bytes(self.logical_micros));
        out[16..20].copy_from_slice(&order.u32_bytes(self.data_size));
        out
    }

    pub fn decode(bytes: [u8; Self::SIZE as usize], order: ByteOrder) -> Self {
        SampleHeader {
            realtime_seconds: order.read_i32(array_at(&bytes, 0)),
            realtime_micros: order.read_i32(array_at(&bytes, 4)),
            logical_seconds: order.read_i32(array_at(&bytes, 8)),
            logical_micros: order.read_i32(array_at(&bytes, 12)),
            data_size: order.read_u32(array_at(&bytes, 16)),
        }
    }
}

/// Body of a `Stream` block.
pub(crate) fn encode_stream_declaration(
    order: ByteOrder,
    stream_type: StreamType,
    name: &str,
    type_name: &str,
    type_description: &str,
    metadata: &[StreamMetadata],
) -> ReplayResult<Vec<u8>> {
    let mut body = vec![u8::from(stream_type)];
    for field in [name, type_name, type_description] {
        encode_string(order, field, &mut body)?;
    }
    let count =
        u32::try_from(metadata.len()).map_err(|_| Details::StringTooLong(metadata.len()))?;
    body.extend_from_slice(&order.u32_bytes(count));
    for pair in metadata {
        encode_string(order, &pair.key, &mut body)?;
        encode_string(order, &pair.value, &mut body)?;
    }
    Ok(body)
}

fn encode_string(order: ByteOrder, s: &str, out: &mut Vec<u8>) -> ReplayResult<()> {
    let len = u32::try_from(s.len()).map_err(|_| Details::StringTooLong(s.len()))?;
    out.extend_from_slice(&order.u32_bytes(len));
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Parse the body of a `Stream` block declared with `stream_id`.
///
/// `offset` is the position of the block, for error reporting.
pub(crate) fn decode_stream_declaration(
    stream_id: u16,
    body: &[u8],
    order: ByteOrder,
    offset: u64,
) -> ReplayResult<StreamDescription> {
    let mut fields = FieldReader {
        bytes: body,
        order,
        offset,
    };
    let stream_type = StreamType::from(fields.u8()?);
    let name = fields.string()?;
    let type_name = fields.string()?;
    let type_description = fields.string()?;
    let count = fields.u32()?;
    let mut metadata = Vec::new();
    for _ in 0..count {
        let key = fields.string()?;
        let value = fields.string()?;
        metadata.push(StreamMetadata { key, value });
    }
    if name.is_empty() {
        return Err(fields.malformed("empty stream name"));
    }
    if !fields.bytes.is_empty() {
        return Err(fields.malformed(format!("{} trailing bytes", fields.bytes.len())));
    }

    Ok(StreamDescription::builder()
        .id(stream_id)
        .name(name)
        .stream_type(stream_type)
        .type_name(type_name)
        .type_description(type_description)
        .metadata(metadata)
        .build())
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    order: ByteOrder,
    offset: u64,
}

impl<'a> FieldReader<'a> {
    fn malformed(&self, reason: impl Into<String>) -> crate::Error {
        Details::MalformedStreamDeclaration {
            offset: self.offset,
            reason: reason.into(),
        }
        .into()
    }

    fn take(&mut self, n: usize) -> ReplayResult<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(self.malformed(format!(
                "needed {n} more bytes, only {} left",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self) -> ReplayResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> ReplayResult<u32> {
        let bytes = self.take(4)?;
        Ok(self.order.read_u32(array_at(bytes, 0)))
    }

    fn string(&mut self) -> ReplayResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Details::ConvertToUtf8(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use replay_test_helper::TestResult;

    #[test]
    fn test_prologue_layout() -> TestResult {
        let bytes = Prologue::new(ByteOrder::Big).encode();
        assert_eq!(&bytes[..7], b"POCOSIM");
        assert_eq!(&bytes[7..11], &[2, 0, 0, 0]);
        assert_eq!(&bytes[11..15], &[1, 0, 0, 0]);

        let prologue = Prologue::read(&mut &bytes[..])?;
        assert_eq!(prologue.byte_order, ByteOrder::Big);
        assert_eq!(prologue.version, FORMAT_VERSION);

        Ok(())
    }

    #[test]
    fn test_prologue_rejects_bad_magic_and_version() {
        let mut bytes = Prologue::new(ByteOrder::Little).encode();
        bytes[0] = b'X';
        assert!(matches!(
            Prologue::read(&mut &bytes[..]).map_err(crate::Error::into_details),
            Err(Details::PrologueMagic)
        ));

        let mut bytes = Prologue::new(ByteOrder::Little).encode();
        bytes[7] = 9;
        assert!(matches!(
            Prologue::read(&mut &bytes[..]).map_err(crate::Error::into_details),
            Err(Details::UnsupportedVersion {
                found: 9,
                expected: 2
            })
        ));

        let short: &[u8] = b"POCO";
        assert!(matches!(
            Prologue::read(&mut &short[..]).map_err(crate::Error::into_details),
            Err(Details::ReadPrologue(_))
        ));
    }

    #[test]
    fn test_block_header_layout() -> TestResult {
        let header = BlockHeader {
            block_type: BlockType::Data,
            stream_id: 0x0102,
            data_size: 28,
        };
        let bytes = header.encode(ByteOrder::Little);
        assert_eq!(bytes, [2, 0, 0x02, 0x01, 28, 0, 0, 0]);
        assert_eq!(BlockHeader::decode(bytes, ByteOrder::Little, 0)?, header);

        Ok(())
    }

    #[test]
    fn test_block_header_unknown_type() {
        let result = BlockHeader::decode([7, 0, 0, 0, 0, 0, 0, 0], ByteOrder::Little, 99);
        assert!(matches!(
            result.map_err(crate::Error::into_details),
            Err(Details::UnknownBlockType {
                block_type: 7,
                offset: 99
            })
        ));
    }

    #[test]
    fn test_sample_header_layout() {
        let header = SampleHeader::new(Timestamp::new(10, 20), Timestamp::new(-1, 40), 5);
        let bytes = header.encode(ByteOrder::Big);
        assert_eq!(
            bytes,
            [
                0, 0, 0, 10, 0, 0, 0, 20, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 40, 0, 0, 0, 5
            ]
        );
        let decoded = SampleHeader::decode(bytes, ByteOrder::Big);
        assert_eq!(decoded, header);
        assert_eq!(decoded.logical(), Timestamp::new(-1, 40));
        assert_eq!(decoded.realtime(), Timestamp::new(10, 20));
    }

    #[test]
    fn test_stream_declaration() -> TestResult {
        let metadata = vec![StreamMetadata::new("rock_task_name", "imu")];
        let body = encode_stream_declaration(
            ByteOrder::Little,
            StreamType::Data,
            "imu.acceleration",
            "/base/Vector3d",
            "<typelib/>",
            &metadata,
        )?;
        let desc = decode_stream_declaration(3, &body, ByteOrder::Little, 15)?;
        assert_eq!(desc.id(), 3);
        assert_eq!(desc.name(), "imu.acceleration");
        assert_eq!(desc.type_name(), "/base/Vector3d");
        assert_eq!(desc.type_description(), "<typelib/>");
        assert_eq!(desc.metadata(), metadata.as_slice());

        let truncated = decode_stream_declaration(3, &body[..body.len() - 1], ByteOrder::Little, 15);
        assert!(matches!(
            truncated.map_err(crate::Error::into_details),
            Err(Details::MalformedStreamDeclaration { offset: 15, .. })
        ));

        Ok(())
    }

    #[test]
    fn test_stream_declaration_rejects_empty_name() -> TestResult {
        let body =
            encode_stream_declaration(ByteOrder::Little, StreamType::Data, "", "t", "", &[])?;
        assert!(decode_stream_declaration(0, &body, ByteOrder::Little, 0).is_err());

        Ok(())
    }
}
