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

//! Identity and schema of the streams declared in a log.

use serde::Serialize;
use std::collections::HashMap;

/// Kind of a stream, as tagged in its declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
pub enum StreamType {
    /// Timestamped samples; the only kind visible to consumers.
    Data,
    Control,
    /// A tag this library does not know, kept so it can be written back unchanged.
    Other(u8),
}

impl From<u8> for StreamType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => StreamType::Data,
            2 => StreamType::Control,
            other => StreamType::Other(other),
        }
    }
}

impl From<StreamType> for u8 {
    fn from(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Data => 1,
            StreamType::Control => 2,
            StreamType::Other(tag) => tag,
        }
    }
}

/// One free-form key/value pair attached to a stream declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct StreamMetadata {
    pub key: String,
    pub value: String,
}

impl StreamMetadata {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        StreamMetadata {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Everything a stream declaration says about a stream.
///
/// Two descriptions are equal when all fields match; metadata is compared as a map, so the
/// order of the pairs does not matter.
#[derive(Clone, Debug, Serialize, bon::Builder)]
pub struct StreamDescription {
    /// Stream index inside the file it was declared in.
    #[builder(default)]
    id: u16,
    #[builder(into)]
    name: String,
    #[builder(default = StreamType::Data)]
    stream_type: StreamType,
    #[builder(into)]
    type_name: String,
    #[builder(into, default)]
    type_description: String,
    #[builder(default)]
    metadata: Vec<StreamMetadata>,
}

impl StreamDescription {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn is_data(&self) -> bool {
        self.stream_type == StreamType::Data
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The type schema, opaque to this library.
    pub fn type_description(&self) -> &str {
        &self.type_description
    }

    /// Metadata pairs in the order they were declared.
    pub fn metadata(&self) -> &[StreamMetadata] {
        &self.metadata
    }

    /// Metadata as a map. When a key is declared more than once, the last value wins.
    pub fn metadata_map(&self) -> HashMap<String, String> {
        self.metadata
            .iter()
            .map(|m| (m.key.clone(), m.value.clone()))
            .collect()
    }

    /// Metadata materialized from [`metadata_map`](Self::metadata_map) and sorted by key.
    ///
    /// This is the sequence written into exported logs, so exports do not depend on hash
    /// ordering.
    pub fn sorted_metadata(&self) -> Vec<StreamMetadata> {
        let mut metadata: Vec<StreamMetadata> = self
            .metadata_map()
            .into_iter()
            .map(|(key, value)| StreamMetadata { key, value })
            .collect();
        metadata.sort_by(|a, b| a.key.cmp(&b.key));
        metadata
    }
}

impl PartialEq for StreamDescription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.stream_type == other.stream_type
            && self.type_name == other.type_name
            && self.type_description == other.type_description
            && self.metadata_map() == other.metadata_map()
    }
}

impl Eq for StreamDescription {}
