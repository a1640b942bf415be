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

//! Shared helpers for the `rock-replay` test suites.

pub mod logger;

#[ctor::ctor]
fn before_all() {
    logger::install();
}

/// Installs the capturing logger. Safe to call from every test.
pub fn init() {
    logger::install();
}

/// Marker error for tests.
///
/// Converting any displayable error into it panics right away, so a failing `?` in a test
/// reports the location of the `?` instead of the end of the test.
#[derive(Debug)]
pub struct TestError;

/// A convenience type alias for test functions that want to use `?`.
pub type TestResult = anyhow::Result<(), TestError>;

impl<E: std::fmt::Display> From<E> for TestError {
    #[track_caller]
    fn from(err: E) -> TestError {
        panic!("{}: {}", std::any::type_name::<E>(), err)
    }
}
