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

use crate::{ReplayResult, error::Details};
use std::{
    io::Read,
    sync::{
        Once,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Maximum number of bytes that can be allocated for a single sample or stream declaration.
/// This is a protection against ill-formed logs, whose size fields might be interpreted as
/// enormous. See [`max_allocation_bytes`] to change this limit.
pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = 512 * 1024 * 1024;
static MAX_ALLOCATION_BYTES: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_ALLOCATION_BYTES);
static MAX_ALLOCATION_BYTES_ONCE: Once = Once::new();

/// Set a new maximum number of bytes that can be allocated when reading samples.
/// Once called, the limit cannot be changed.
///
/// **NOTE** This function must be called before reading **any** log. The library leverages
/// [`std::sync::Once`] to set the limit either when calling this method, or when reading for
/// the first time.
pub fn max_allocation_bytes(num_bytes: usize) -> usize {
    MAX_ALLOCATION_BYTES_ONCE.call_once(|| {
        MAX_ALLOCATION_BYTES.store(num_bytes, Ordering::Release);
    });
    MAX_ALLOCATION_BYTES.load(Ordering::Acquire)
}

pub fn safe_len(len: usize) -> ReplayResult<usize> {
    let max_bytes = max_allocation_bytes(DEFAULT_MAX_ALLOCATION_BYTES);

    if len <= max_bytes {
        Ok(len)
    } else {
        Err(Details::MemoryAllocation {
            desired: len,
            maximum: max_bytes,
        }
        .into())
    }
}

/// Byte order of everything following the prologue of a log file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// The byte order of the platform this code runs on.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub(crate) fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    pub(crate) fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    pub(crate) fn read_i32(self, bytes: [u8; 4]) -> i32 {
        match self {
            ByteOrder::Little => i32::from_le_bytes(bytes),
            ByteOrder::Big => i32::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u16_bytes(self, n: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => n.to_le_bytes(),
            ByteOrder::Big => n.to_be_bytes(),
        }
    }

    pub(crate) fn u32_bytes(self, n: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => n.to_le_bytes(),
            ByteOrder::Big => n.to_be_bytes(),
        }
    }

    pub(crate) fn i32_bytes(self, n: i32) -> [u8; 4] {
        match self {
            ByteOrder::Little => n.to_le_bytes(),
            ByteOrder::Big => n.to_be_bytes(),
        }
    }
}

/// Copy the next `N` bytes of `bytes` into an array.
///
/// The caller guarantees `bytes` is long enough.
pub(crate) fn array_at<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

pub(crate) fn read_array<R: Read, const N: usize>(reader: &mut R) -> std::io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use replay_test_helper::TestResult;

    #[test]
    fn test_safe_len() -> TestResult {
        assert_eq!(42usize, safe_len(42usize)?);
        assert!(safe_len(1024 * 1024 * 1024).is_err());

        Ok(())
    }

    #[test]
    fn test_byte_order_integers() {
        assert_eq!(ByteOrder::Little.u32_bytes(0x0102_0304), [4, 3, 2, 1]);
        assert_eq!(ByteOrder::Big.u32_bytes(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(ByteOrder::Big.read_u16([0x12, 0x34]), 0x1234);
        assert_eq!(ByteOrder::Little.read_u16([0x12, 0x34]), 0x3412);
        assert_eq!(ByteOrder::Big.read_i32(ByteOrder::Big.i32_bytes(-5)), -5);
        assert_eq!(ByteOrder::Little.read_i32([0xff, 0xff, 0xff, 0xff]), -1);
    }

    #[test]
    fn test_native_matches_target() {
        let native = ByteOrder::native();
        assert_eq!(native.u32_bytes(7), 7u32.to_ne_bytes());
    }

    #[test]
    fn test_read_array_short_input() {
        let mut input: &[u8] = &[1, 2, 3];
        let result: std::io::Result<[u8; 4]> = read_array(&mut input);
        assert_eq!(
            result.unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );
    }
}
