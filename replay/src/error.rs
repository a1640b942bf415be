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

use std::{error::Error as _, fmt, path::PathBuf};

/// Errors encountered while reading or exporting logs.
///
/// To inspect the details of the error use [`details`](Self::details) or
/// [`into_details`](Self::into_details) to get a [`Details`] which contains more precise error
/// information.
///
/// See [`Details`] for all possible errors.
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    /// `true` if a stream name could not be resolved to a data stream.
    pub fn is_not_found(&self) -> bool {
        matches!(*self.details, Details::StreamNotFound(_))
    }

    /// `true` if the decode path rejected a sample.
    ///
    /// This is the only condition the export loop recovers from, by skipping the sample.
    pub fn is_corrupt_sample(&self) -> bool {
        matches!(*self.details, Details::CorruptSample { .. })
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

#[derive(thiserror::Error)]
pub enum Details {
    #[error("Failed to open log file {path:?}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read log prologue: {0}")]
    ReadPrologue(#[source] std::io::Error),

    #[error("wrong magic in log prologue")]
    PrologueMagic,

    #[error("Unsupported log format version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Failed to read block header at offset {offset}: {source}")]
    ReadBlockHeader {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown block type {block_type} at offset {offset}")]
    UnknownBlockType { block_type: u8, offset: u64 },

    #[error("Failed to read stream declaration at offset {offset}: {source}")]
    ReadStreamDeclaration {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed stream declaration at offset {offset}: {reason}")]
    MalformedStreamDeclaration { offset: u64, reason: String },

    #[error("Failed to convert bytes to UTF-8 string: {0}")]
    ConvertToUtf8(#[source] std::string::FromUtf8Error),

    #[error("Stream {0} is declared twice")]
    DuplicateStream(u16),

    #[error("Stream {0} was never declared")]
    UndeclaredStream(u16),

    #[error("No data stream named '{0}'")]
    StreamNotFound(String),

    #[error("Sample index {index} is out of range, the stream has {total} samples")]
    SampleOutOfRange { index: u64, total: u64 },

    #[error("Invalid sample range: start {start} is past end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Could not load header of sample {index}: {source}")]
    ReadSampleHeader {
        index: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not load data of sample {index}: {source}")]
    ReadSamplePayload {
        index: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Sample {index} is corrupt: {reason}")]
    CorruptSample { index: u64, reason: String },

    #[error("Sample payload of {0} bytes does not fit in a data block")]
    SampleTooLarge(usize),

    #[error("String of {0} bytes does not fit in a stream declaration")]
    StringTooLong(usize),

    #[error("Unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("Failed to create destination {path:?}: {source}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write bytes: {0}")]
    WriteBytes(#[source] std::io::Error),

    #[error("Failed to flush inner writer: {0}")]
    FlushWriter(#[source] std::io::Error),

    #[error("Index cache {path:?} is unusable: {reason}")]
    IndexCache { path: PathBuf, reason: String },

    #[error("Failed to spawn export worker: {0}")]
    SpawnWorker(#[source] std::io::Error),

    #[error("Export worker panicked")]
    WorkerPanicked,
}

impl fmt::Debug for Details {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut msg = self.to_string();
        if let Some(e) = self.source() {
            msg.extend([": ", &e.to_string()]);
        }
        write!(f, "{msg}")
    }
}
