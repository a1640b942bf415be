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

//! Logic handling reading logs at user level.

mod scan;

use crate::{
    ReplayResult,
    accessor::SampleAccessor,
    catalog::StreamCatalog,
    error::Details,
    export::{self, ExportRequest},
    format::Prologue,
    index::{
        StreamIndex,
        cache::{self, SourceStamp},
    },
    stream::StreamDescription,
    util::ByteOrder,
};
use bon::bon;
use log::{debug, warn};
use scan::ScannedStream;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    ops::ControlFlow,
    path::{Path, PathBuf},
    sync::Arc,
};

/// An open log: its stream catalog and the sample index of every stream.
///
/// Opening walks the whole file once (or loads the index cache, see
/// [`LogReader::builder`]). After that the reader holds no file handle: every
/// [`SampleAccessor`] and every export opens its own.
///
/// ```no_run
/// # use rock_replay::LogReader;
/// # use std::ops::ControlFlow;
/// # fn main() -> rock_replay::ReplayResult<()> {
/// let reader = LogReader::open("run.0.log")?;
/// for stream in reader.list_data_streams() {
///     println!("{} ({})", stream.name(), stream.type_name());
/// }
/// let written = reader.export_range(
///     "imu.acceleration",
///     100,
///     200,
///     "run.0-000100-000200.log",
///     |_| ControlFlow::Continue(()),
///     || false,
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LogReader {
    path: PathBuf,
    byte_order: ByteOrder,
    catalog: StreamCatalog,
    indexes: HashMap<u16, Arc<StreamIndex>>,
}

#[bon]
impl LogReader {
    /// Opens the log at `path`.
    ///
    /// With `index_cache` set, sample indexes are loaded from `<path>.idx` when that file matches
    /// the log, and written there after a full scan otherwise. Problems with the cache are
    /// logged and never prevent opening the log.
    #[builder(finish_fn = build)]
    pub fn builder(
        #[builder(start_fn)] path: PathBuf,
        #[builder(default = false)] index_cache: bool,
    ) -> ReplayResult<LogReader> {
        let open_error = |source| Details::OpenLog {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(open_error)?;
        let source = SourceStamp::of(&file.metadata().map_err(open_error)?);
        let source_len = source.len;
        let mut reader = BufReader::new(file);
        let prologue = Prologue::read(&mut reader)?;
        let order = prologue.byte_order;

        let streams = if index_cache {
            let cache_path = cache::cache_path(&path);
            let cached = cache::load(&cache_path, source)
                .and_then(|cached| {
                    cached
                        .map(|cached| scan::from_cache(&mut reader, order, cached))
                        .transpose()
                })
                .unwrap_or_else(|e| {
                    warn!("Ignoring index cache: {e}");
                    None
                });
            match cached {
                Some(streams) => {
                    debug!("Loaded sample index of {path:?} from {cache_path:?}");
                    streams
                }
                None => {
                    reader
                        .seek(SeekFrom::Start(Prologue::SIZE))
                        .map_err(open_error)?;
                    let streams = scan::scan_blocks(&mut reader, order, source_len)?;
                    let entries = streams
                        .iter()
                        .map(|stream| (stream.declaration_offset, &stream.index));
                    if let Err(e) = cache::store(&cache_path, source, entries) {
                        warn!("Could not write index cache: {e}");
                    }
                    streams
                }
            }
        } else {
            scan::scan_blocks(&mut reader, order, source_len)?
        };

        Ok(LogReader::from_scanned(path, order, streams))
    }
}

impl LogReader {
    /// Opens the log at `path` without an index cache.
    pub fn open(path: impl AsRef<Path>) -> ReplayResult<LogReader> {
        LogReader::builder(path.as_ref().to_path_buf()).build()
    }

    fn from_scanned(path: PathBuf, byte_order: ByteOrder, streams: Vec<ScannedStream>) -> Self {
        let mut descriptions = Vec::with_capacity(streams.len());
        let mut indexes = HashMap::with_capacity(streams.len());
        for stream in streams {
            indexes.insert(stream.description.id(), Arc::new(stream.index));
            descriptions.push(stream.description);
        }
        LogReader {
            path,
            byte_order,
            catalog: StreamCatalog::new(descriptions),
            indexes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte order of the log body, as declared by its prologue.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn catalog(&self) -> &StreamCatalog {
        &self.catalog
    }

    pub fn list_data_streams(&self) -> Vec<StreamDescription> {
        self.catalog.list_data_streams()
    }

    pub fn stream_description(&self, stream_name: &str) -> ReplayResult<StreamDescription> {
        self.catalog.resolve(stream_name)
    }

    pub fn stream_index(&self, stream_name: &str) -> ReplayResult<Arc<StreamIndex>> {
        let description = self.catalog.resolve(stream_name)?;
        Ok(self.index_of(&description))
    }

    /// Opens an accessor on the data stream called `stream_name`.
    pub fn open_stream(&self, stream_name: &str) -> ReplayResult<SampleAccessor> {
        let description = self.catalog.resolve(stream_name)?;
        self.accessor_for(description)
    }

    /// Copies samples `[start_index, end_index)` of `stream_name` into a new log at
    /// `destination`, see [`export_range`](crate::export::export_range).
    pub fn export_range<P, C>(
        &self,
        stream_name: &str,
        start_index: u64,
        end_index: u64,
        destination: impl AsRef<Path>,
        on_progress: P,
        is_cancelled: C,
    ) -> ReplayResult<u64>
    where
        P: FnMut(u64) -> ControlFlow<()>,
        C: FnMut() -> bool,
    {
        export::export_range(
            self,
            stream_name,
            start_index,
            end_index,
            destination.as_ref(),
            on_progress,
            is_cancelled,
        )
    }

    pub fn export<P, C>(
        &self,
        request: &ExportRequest,
        on_progress: P,
        is_cancelled: C,
    ) -> ReplayResult<u64>
    where
        P: FnMut(u64) -> ControlFlow<()>,
        C: FnMut() -> bool,
    {
        self.export_range(
            &request.stream_name,
            request.start_index,
            request.end_index,
            &request.destination,
            on_progress,
            is_cancelled,
        )
    }

    pub(crate) fn index_of(&self, description: &StreamDescription) -> Arc<StreamIndex> {
        self.indexes
            .get(&description.id())
            .cloned()
            .unwrap_or_else(|| Arc::new(StreamIndex::new(description.id())))
    }

    pub(crate) fn accessor_for(
        &self,
        description: StreamDescription,
    ) -> ReplayResult<SampleAccessor> {
        let index = self.index_of(&description);
        SampleAccessor::open(&self.path, description, index, self.byte_order)
    }
}

/// Lists the data streams of the log at `path`.
pub fn list_data_streams(path: impl AsRef<Path>) -> ReplayResult<Vec<StreamDescription>> {
    Ok(LogReader::open(path)?.list_data_streams())
}

/// Opens the data stream `stream_name` of the log at `path`.
pub fn open_stream(path: impl AsRef<Path>, stream_name: &str) -> ReplayResult<SampleAccessor> {
    LogReader::open(path)?.open_stream(stream_name)
}
