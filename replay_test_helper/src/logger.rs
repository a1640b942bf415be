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

use log::{LevelFilter, Log, Metadata, Record};
use std::{cell::RefCell, sync::Once};

// Messages are kept per thread so tests running in parallel do not see each other's output.
thread_local! {
    static LOG_MESSAGES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

struct TestLogger;

impl Log for TestLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("{}", record.args());
            LOG_MESSAGES.with(|messages| messages.borrow_mut().push(message));
        }
    }

    fn flush(&self) {}
}

static LOGGER: TestLogger = TestLogger;
static INSTALL: Once = Once::new();

pub(crate) fn install() {
    INSTALL.call_once(|| {
        // Another logger may already be installed by the test binary; then nothing is captured.
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Debug);
        }
    });
}

/// Drops every message captured so far on the current thread.
pub fn clear_log_messages() {
    LOG_MESSAGES.with(|messages| messages.borrow_mut().clear());
}

/// Returns a copy of the messages captured so far on the current thread.
pub fn log_messages() -> Vec<String> {
    LOG_MESSAGES.with(|messages| messages.borrow().clone())
}

#[track_caller]
pub fn assert_logged(expected_message: &str) {
    let messages = log_messages();
    assert!(
        messages.iter().any(|m| m == expected_message),
        "Expected log message '{expected_message}' not found in {messages:?}"
    );
}

#[track_caller]
pub fn assert_not_logged(unexpected_message: &str) {
    let messages = log_messages();
    assert!(
        !messages.iter().any(|m| m == unexpected_message),
        "The following log message should not have been logged: '{unexpected_message}'"
    );
}
