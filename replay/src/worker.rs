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

//! Running an export on a background thread.

use crate::{ReplayResult, error::Details, export::ExportRequest, reader::LogReader};
use bon::bon;
use log::debug;
use std::{
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

// Stored in the progress cell until the first sample was published.
const NO_PROGRESS: u64 = u64::MAX;

/// Rate limit for progress reports.
///
/// Lets a report through when `interval` has passed since the previous one, and always lets
/// the report of `final_index` through so the last published value is the end of the range.
#[derive(Clone, Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    final_index: u64,
    last_published: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration, final_index: u64) -> Self {
        ProgressThrottle {
            interval,
            final_index,
            last_published: None,
        }
    }

    pub fn should_publish(&mut self, sample_index: u64) -> bool {
        let now = Instant::now();
        let due = match self.last_published {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };
        if due || sample_index == self.final_index {
            self.last_published = Some(now);
            true
        } else {
            false
        }
    }
}

/// An export running on its own thread.
///
/// ```no_run
/// # use rock_replay::{ExportRequest, ExportWorker, LogReader};
/// # use std::sync::Arc;
/// # fn main() -> rock_replay::ReplayResult<()> {
/// let reader = Arc::new(LogReader::open("run.0.log")?);
/// let request = ExportRequest::builder()
///     .stream_name("imu.acceleration")
///     .start_index(0)
///     .end_index(1000)
///     .destination("imu.log")
///     .build();
/// let worker = ExportWorker::spawn(reader, request)?;
/// while !worker.is_finished() {
///     println!("at sample {:?}", worker.progress());
///     std::thread::sleep(std::time::Duration::from_millis(200));
/// }
/// let written = worker.join()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ExportWorker {
    request: ExportRequest,
    cancelled: Arc<AtomicBool>,
    progress: Arc<AtomicU64>,
    handle: JoinHandle<ReplayResult<u64>>,
}

#[bon]
impl ExportWorker {
    #[builder(finish_fn = spawn)]
    pub fn builder(
        #[builder(start_fn)] reader: Arc<LogReader>,
        #[builder(start_fn)] request: ExportRequest,
        /// Minimum time between two progress updates.
        #[builder(default = DEFAULT_PROGRESS_INTERVAL)]
        progress_interval: Duration,
    ) -> ReplayResult<ExportWorker> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(AtomicU64::new(NO_PROGRESS));

        let thread_request = request.clone();
        let thread_cancelled = Arc::clone(&cancelled);
        let thread_progress = Arc::clone(&progress);
        let handle = std::thread::Builder::new()
            .name("replay-export".to_string())
            .spawn(move || {
                let mut throttle = ProgressThrottle::new(
                    progress_interval,
                    thread_request.end_index.saturating_sub(1),
                );
                let result = reader.export(
                    &thread_request,
                    |sample_index| {
                        if throttle.should_publish(sample_index) {
                            thread_progress.store(sample_index, Ordering::Relaxed);
                        }
                        ControlFlow::Continue(())
                    },
                    || thread_cancelled.load(Ordering::Relaxed),
                );
                debug!(
                    "Export worker for {} finished: {result:?}",
                    thread_request.stream_name
                );
                result
            })
            .map_err(Details::SpawnWorker)?;

        Ok(ExportWorker {
            request,
            cancelled,
            progress,
            handle,
        })
    }
}

impl ExportWorker {
    /// Starts exporting `request` with the default progress interval.
    pub fn spawn(reader: Arc<LogReader>, request: ExportRequest) -> ReplayResult<ExportWorker> {
        ExportWorker::builder(reader, request).spawn()
    }

    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    /// Asks the export to stop after the sample it is working on.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Index of the last sample reported, or `None` before the first report.
    pub fn progress(&self) -> Option<u64> {
        match self.progress.load(Ordering::Relaxed) {
            NO_PROGRESS => None,
            sample_index => Some(sample_index),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the export to end and returns the number of samples written.
    pub fn join(self) -> ReplayResult<u64> {
        self.handle
            .join()
            .map_err(|_| crate::Error::from(Details::WorkerPanicked))?
    }
}
