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

use crate::{ReplayResult, error::Details, stream::StreamDescription};
use log::info;
use std::collections::BTreeMap;

/// The streams declared in one log, in declaration order.
///
/// Only data streams are handed out. Other streams are kept for completeness and reported
/// through the `log` facade every time a lookup walks past them.
#[derive(Clone, Debug, Default)]
pub struct StreamCatalog {
    streams: Vec<StreamDescription>,
}

/// A data stream as listed by [`StreamCatalog::grouped_by_task`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortEntry {
    pub port: String,
    pub type_name: String,
    pub stream_name: String,
}

impl StreamCatalog {
    pub fn new(streams: Vec<StreamDescription>) -> Self {
        StreamCatalog { streams }
    }

    /// All declared streams, data or not.
    pub fn all_streams(&self) -> &[StreamDescription] {
        &self.streams
    }

    pub fn list_data_streams(&self) -> Vec<StreamDescription> {
        self.data_streams().cloned().collect()
    }

    /// The first data stream called `name`.
    pub fn resolve(&self, name: &str) -> ReplayResult<StreamDescription> {
        self.data_streams()
            .find(|desc| desc.name() == name)
            .cloned()
            .ok_or_else(|| Details::StreamNotFound(name.to_string()).into())
    }

    /// Data streams grouped by task, splitting `task.port` names at the first dot.
    ///
    /// Streams whose name has no dot do not belong to a task and are left out.
    pub fn grouped_by_task(&self) -> BTreeMap<String, Vec<PortEntry>> {
        let mut tasks: BTreeMap<String, Vec<PortEntry>> = BTreeMap::new();
        for desc in self.data_streams() {
            if let Some((task, port)) = desc.name().split_once('.') {
                tasks.entry(task.to_string()).or_default().push(PortEntry {
                    port: port.to_string(),
                    type_name: desc.type_name().to_string(),
                    stream_name: desc.name().to_string(),
                });
            }
        }
        tasks
    }

    fn data_streams(&self) -> impl Iterator<Item = &StreamDescription> {
        self.streams.iter().filter(|desc| {
            if desc.is_data() {
                true
            } else {
                info!("Ignoring stream {}", desc.name());
                false
            }
        })
    }
}
