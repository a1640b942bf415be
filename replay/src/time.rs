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

use serde::Serialize;
use std::fmt;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// A point in time as stored in sample headers: whole seconds plus microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Timestamp {
    pub seconds: i32,
    pub micros: i32,
}

impl Timestamp {
    pub const fn new(seconds: i32, micros: i32) -> Self {
        Timestamp { seconds, micros }
    }

    /// Microseconds since the epoch.
    pub fn as_micros(&self) -> i64 {
        i64::from(self.seconds) * MICROS_PER_SECOND + i64::from(self.micros)
    }

    /// Normalized timestamp, `micros` always in `0..1_000_000`.
    ///
    /// Seconds outside the `i32` range wrap, like the on-disk field does.
    pub fn from_micros(micros: i64) -> Self {
        Timestamp {
            seconds: micros.div_euclid(MICROS_PER_SECOND) as i32,
            micros: micros.rem_euclid(MICROS_PER_SECOND) as i32,
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Unnormalized values (micros >= 1s) still sort by the instant they denote.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_micros()
            .cmp(&other.as_micros())
            .then_with(|| (self.seconds, self.micros).cmp(&(other.seconds, other.micros)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let normalized = Timestamp::from_micros(self.as_micros());
        write!(f, "{}.{:06}", normalized.seconds, normalized.micros)
    }
}
