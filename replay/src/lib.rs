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

//! **rock-replay** reads multi-stream sensor logs and cuts them into smaller logs.
//!
//! A log is a binary container: a short prologue followed by blocks. Each stream is declared
//! once by a block carrying its name, the name and description of its sample type, and free
//! form metadata. Samples follow as data blocks, each with a realtime and a logical timestamp
//! and an opaque payload. See [`format`] for the byte layout.
//!
//! Opening a log with [`LogReader`] walks its blocks once and builds a [`StreamIndex`] per
//! stream, so any sample can then be reached by number:
//!
//! ```no_run
//! # fn main() -> rock_replay::ReplayResult<()> {
//! let mut stream = rock_replay::open_stream("run.0.log", "imu.acceleration")?;
//! println!("{} samples", stream.total_samples());
//! let payload = stream.decoded_sample(42)?;
//! # Ok(())
//! # }
//! ```
//!
//! A range of one stream can be copied into a new log, byte for byte, with
//! [`LogReader::export_range`], or in the background with an [`ExportWorker`].
//!
//! Only streams of the data kind are listed and opened. Every other stream is skipped and
//! reported through the [`log`](https://docs.rs/log) facade; install a logger to see it.

mod accessor;
mod catalog;
mod export;
mod index;
mod reader;
mod stream;
mod time;
mod worker;
mod writer;

pub mod error;
pub mod format;
pub mod util;

pub use accessor::{Sample, SampleAccessor};
pub use catalog::{PortEntry, StreamCatalog};
pub use error::Error;
pub use export::{EXPORTED_STREAM_ID, ExportRequest, default_export_path, export_range};
pub use index::{IndexEntry, StreamIndex};
pub use reader::{LogReader, list_data_streams, open_stream};
pub use stream::{StreamDescription, StreamMetadata, StreamType};
pub use time::Timestamp;
pub use util::{ByteOrder, max_allocation_bytes};
pub use worker::{DEFAULT_PROGRESS_INTERVAL, ExportWorker, ProgressThrottle};
pub use writer::LogWriter;

/// A convenience type alias for `Result`s with `Error`s.
pub type ReplayResult<T> = Result<T, Error>;
