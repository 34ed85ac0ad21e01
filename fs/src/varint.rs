// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A little-endian base-127 varint, used for both the cumulative chain
//! offset at the start of a sector and the length prefix in front of
//! every record.
//!
//! Standard LEB128 can legitimately encode a byte equal to `0xFF` (any
//! value whose low 7 bits are `0x7F` and which needs a continuation byte,
//! e.g. 255), which collides with the erased-sector sentinel. Digits here
//! are base 127 rather than base 128, so neither a continuation byte
//! (`0x80..=0xFE`) nor a terminal byte (`0x00..=0x7E`) can ever be `0xFF`,
//! for any `u64` value — no length restriction required to make the
//! sentinel unambiguous.

use stratafs_err::{CorruptionKind, Error, Result};

/// A sector position holding this byte has never been written.
pub const ERASED_BYTE: u8 = 0xFF;

/// No encoded varint is longer than this for any `u64`.
pub const MAX_LEN: usize = 10;

const RADIX: u64 = 127;

/// Number of bytes `encode` would write for `value`.
pub fn encoded_len(value: u64) -> usize {
    let mut v = value;
    let mut n = 1;
    while v >= RADIX {
        v /= RADIX;
        n += 1;
    }
    n
}

/// Writes `value` to the front of `out`, returning the number of bytes
/// written. `out` must be at least `encoded_len(value)` bytes.
pub fn encode(value: u64, out: &mut [u8]) -> usize {
    let mut v = value;
    let mut i = 0;
    loop {
        if v < RADIX {
            out[i] = v as u8;
            return i + 1;
        }
        out[i] = 0x80 | (v % RADIX) as u8;
        v /= RADIX;
        i += 1;
    }
}

/// Decodes a varint from the front of `input`, returning the value and
/// the number of bytes it occupied. `input[0] == ERASED_BYTE` is never a
/// valid encoding and is reported as corruption; callers that expect to
/// see the erased sentinel (end-of-records) must check for it before
/// calling `decode`.
pub fn decode(input: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut mult: u64 = 1;
    for (i, &byte) in input.iter().take(MAX_LEN).enumerate() {
        if byte == ERASED_BYTE {
            return Err(Error::Corruption(CorruptionKind::BadVarint));
        }
        let digit = (byte & 0x7F) as u64;
        value = value
            .checked_add(digit * mult)
            .ok_or(Error::Corruption(CorruptionKind::BadVarint))?;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        mult *= RADIX;
    }
    Err(Error::Corruption(CorruptionKind::BadVarint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_emits_the_erased_byte() {
        for value in (0u64..5_000).chain([
            127, 128, 255, 256, 16_383, 16_384, u32::MAX as u64, u64::MAX,
        ]) {
            let len = encoded_len(value);
            let mut buf = [0u8; MAX_LEN];
            let written = encode(value, &mut buf);
            assert_eq!(written, len);
            assert!(
                buf[..written].iter().all(|&b| b != ERASED_BYTE),
                "value {value} encoded to a byte equal to the erased sentinel"
            );
        }
    }

    #[test]
    fn round_trips() {
        for value in [0u64, 1, 126, 127, 128, 255, 16_383, 1 << 20, u32::MAX as u64, u64::MAX] {
            let mut buf = [0u8; MAX_LEN];
            let written = encode(value, &mut buf);
            let (decoded, used) = decode(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(used, written);
        }
    }

    #[test]
    fn rejects_erased_input() {
        let buf = [ERASED_BYTE; MAX_LEN];
        assert!(decode(&buf).is_err());
    }
}
