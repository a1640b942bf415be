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

//! Logic handling writing logs.
use crate::{
    ReplayResult,
    error::Details,
    format::{BlockHeader, BlockType, Prologue, SampleHeader, encode_stream_declaration},
    stream::{StreamDescription, StreamMetadata, StreamType},
    time::Timestamp,
    util::ByteOrder,
};
use std::{collections::HashSet, io::Write};

/// Writes a log container: prologue, stream declarations and samples.
///
/// The prologue is written together with the first record, or by
/// [`into_inner`](LogWriter::into_inner) if nothing else was written. A sample can only be
/// written for a stream declared earlier through the same writer.
pub struct LogWriter<W: Write> {
    writer: W,
    byte_order: ByteOrder,
    has_prologue: bool,
    declared: HashSet<u16>,
}

#[bon::bon]
impl<W: Write> LogWriter<W> {
    #[builder(finish_fn = build)]
    pub fn builder(
        writer: W,
        #[builder(default = ByteOrder::native())] byte_order: ByteOrder,
        /// Has the prologue already been written.
        ///
        /// Set this to `true` to append blocks to an existing log. Appended samples still need
        /// their stream declared through this writer.
        #[builder(default = false)]
        has_prologue: bool,
    ) -> Self {
        LogWriter {
            writer,
            byte_order,
            has_prologue,
            declared: HashSet::new(),
        }
    }
}

impl<W: Write> LogWriter<W> {
    /// Creates a `LogWriter` using the byte order of this platform.
    pub fn new(writer: W) -> Self {
        Self::builder().writer(writer).build()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Declare stream `id`. Returns the number of bytes written.
    pub fn write_stream_declaration(
        &mut self,
        id: u16,
        stream_type: StreamType,
        name: &str,
        type_name: &str,
        type_description: &str,
        metadata: &[StreamMetadata],
    ) -> ReplayResult<usize> {
        if self.declared.contains(&id) {
            return Err(Details::DuplicateStream(id).into());
        }
        let body = encode_stream_declaration(
            self.byte_order,
            stream_type,
            name,
            type_name,
            type_description,
            metadata,
        )?;
        let n = self.write_block(BlockType::Stream, id, &[&body])?;
        self.declared.insert(id);
        Ok(n)
    }

    /// Declare a stream as described, keeping its id.
    pub fn declare(&mut self, description: &StreamDescription) -> ReplayResult<usize> {
        self.write_stream_declaration(
            description.id(),
            description.stream_type(),
            description.name(),
            description.type_name(),
            description.type_description(),
            description.metadata(),
        )
    }

    /// Append one sample of stream `id`. Returns the number of bytes written.
    pub fn write_sample(
        &mut self,
        id: u16,
        realtime: Timestamp,
        logical: Timestamp,
        payload: &[u8],
    ) -> ReplayResult<usize> {
        if !self.declared.contains(&id) {
            return Err(Details::UndeclaredStream(id).into());
        }
        let data_size = u32::try_from(payload.len())
            .ok()
            .filter(|size| u64::from(*size) + SampleHeader::SIZE <= u64::from(u32::MAX))
            .ok_or(Details::SampleTooLarge(payload.len()))?;
        let header = SampleHeader::new(realtime, logical, data_size).encode(self.byte_order);
        self.write_block(BlockType::Data, id, &[&header, payload])
    }

    /// Append an opaque control block for stream `id`.
    pub fn write_control(&mut self, id: u16, payload: &[u8]) -> ReplayResult<usize> {
        self.write_block(BlockType::Control, id, &[payload])
    }

    /// Flush the inner writer, writing the prologue first if it is still missing.
    pub fn flush(&mut self) -> ReplayResult<usize> {
        let n = self.maybe_write_prologue()?;
        self.writer.flush().map_err(Details::FlushWriter)?;
        Ok(n)
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> ReplayResult<W> {
        self.flush()?;
        Ok(self.writer)
    }

    fn maybe_write_prologue(&mut self) -> ReplayResult<usize> {
        if self.has_prologue {
            return Ok(0);
        }
        let prologue = Prologue::new(self.byte_order).encode();
        self.writer
            .write_all(&prologue)
            .map_err(Details::WriteBytes)?;
        self.has_prologue = true;
        Ok(prologue.len())
    }

    fn write_block(
        &mut self,
        block_type: BlockType,
        id: u16,
        parts: &[&[u8]],
    ) -> ReplayResult<usize> {
        let mut num_bytes = self.maybe_write_prologue()?;
        let body_len: usize = parts.iter().map(|part| part.len()).sum();
        let data_size = u32::try_from(body_len).map_err(|_| Details::SampleTooLarge(body_len))?;
        let header = BlockHeader {
            block_type,
            stream_id: id,
            data_size,
        }
        .encode(self.byte_order);

        self.writer
            .write_all(&header)
            .map_err(Details::WriteBytes)?;
        for part in parts {
            self.writer.write_all(part).map_err(Details::WriteBytes)?;
        }
        num_bytes += header.len() + body_len;
        Ok(num_bytes)
    }
}
