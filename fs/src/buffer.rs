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

//! A sector-sized scratch area holding a run of length-prefixed records,
//! terminated by the erased sentinel rather than a record count.
//!
//! The first thing in the buffer is always a cumulative-offset varint
//! (§3): how many bytes of this chain's logical stream preceded this
//! sector. Every record after it is `varint(len) || body[len]`. The
//! first unwritten byte reads `0xFF`; `reserve` asserts the payload
//! region it hands out is still entirely erased before returning it, the
//! same check `delimited_buffer.cpp`'s `reserve` makes.

use stratafs_err::{CorruptionKind, Error, Result};

use crate::varint;

pub struct DelimitedBuffer<'a> {
    bytes: &'a mut [u8],
    cursor: usize,
    chain_offset: u64,
    offset_len: usize,
}

impl<'a> DelimitedBuffer<'a> {
    /// A brand new, fully erased sector about to become a chain's tail.
    /// The cumulative offset is written lazily, on the first `reserve`.
    pub fn empty(bytes: &'a mut [u8], chain_offset: u64) -> Self {
        Self {
            bytes,
            cursor: 0,
            chain_offset,
            offset_len: 0,
        }
    }

    /// Loads a previously written sector: parses the leading offset
    /// varint, then scans forward past each record until hitting the
    /// erased sentinel or running out of room.
    pub fn load(bytes: &'a mut [u8]) -> Result<Self> {
        let (chain_offset, offset_len) = varint::decode(bytes)?;
        let mut cursor = offset_len;
        loop {
            if cursor >= bytes.len() || bytes[cursor] == varint::ERASED_BYTE {
                break;
            }
            let (len, used) = varint::decode(&bytes[cursor..])?;
            let len = len as usize;
            if cursor + used + len > bytes.len() {
                return Err(Error::Corruption(CorruptionKind::BadVarint));
            }
            cursor += used + len;
        }
        Ok(Self {
            bytes,
            cursor,
            chain_offset,
            offset_len,
        })
    }

    /// A read-only view over an already-written sector, for callers that
    /// only need to inspect its header or iterate its records.
    pub fn load_ro(bytes: &'a [u8]) -> Result<ReadOnlyView<'a>> {
        let (chain_offset, offset_len) = varint::decode(bytes)?;
        Ok(ReadOnlyView {
            bytes,
            offset_len,
            chain_offset,
        })
    }

    pub fn chain_offset(&self) -> u64 {
        self.chain_offset
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes still free for records (including their own length prefix).
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn leading_len(&self) -> usize {
        if self.cursor == 0 {
            varint::encoded_len(self.chain_offset)
        } else {
            self.offset_len
        }
    }

    pub fn room_for(&self, length: usize) -> bool {
        let leading = self.leading_len();
        let needed = if self.cursor == 0 { leading } else { 0 } + varint::encoded_len(length as u64) + length;
        needed <= self.remaining()
    }

    /// Reserves `length` bytes for a new record's body, writing its
    /// length prefix (and the sector's leading offset varint, the first
    /// time around) and returning the still-erased payload region.
    pub fn reserve(&mut self, length: usize) -> Result<&mut [u8]> {
        if !self.room_for(length) {
            return Err(Error::NoSpace);
        }
        if self.cursor == 0 {
            debug_assert_eq!(self.bytes[0], varint::ERASED_BYTE, "first reserve on an already-populated sector");
            let written = varint::encode(self.chain_offset, &mut self.bytes[0..]);
            self.offset_len = written;
            self.cursor = written;
        }
        let len_pos = self.cursor;
        let len_written = varint::encode(length as u64, &mut self.bytes[len_pos..]);
        let body_start = len_pos + len_written;
        let body_end = body_start + length;
        if self.bytes[body_start..body_end].iter().any(|&b| b != varint::ERASED_BYTE) {
            return Err(Error::Corruption(CorruptionKind::NotErased));
        }
        self.cursor = body_end;
        Ok(&mut self.bytes[body_start..body_end])
    }

    /// Iterates the records already written, each yielded as
    /// `(tag, body)` where `body` is everything after the tag byte.
    pub fn iter(&self) -> RecordIter<'_> {
        RecordIter {
            bytes: self.bytes,
            pos: self.offset_len,
        }
    }
}

/// A read-only counterpart of [`DelimitedBuffer`] for callers that only
/// need to inspect an already-written sector.
pub struct ReadOnlyView<'a> {
    bytes: &'a [u8],
    offset_len: usize,
    chain_offset: u64,
}

impl<'a> ReadOnlyView<'a> {
    pub fn chain_offset(&self) -> u64 {
        self.chain_offset
    }

    pub fn iter(&self) -> RecordIter<'a> {
        RecordIter {
            bytes: self.bytes,
            pos: self.offset_len,
        }
    }

    /// Iterates the flat, untagged blobs following this sector's header
    /// record. Used by the data chain, whose payload after the header is a
    /// plain run of length-prefixed byte spans rather than tagged records —
    /// skips exactly the one tagged record every sector starts with (the
    /// `SectorHeader`), then reads everything after it as raw spans.
    pub fn raw_iter_after_header(&self) -> Result<RawRecordIter<'a>> {
        let mut pos = self.offset_len;
        if pos < self.bytes.len() && self.bytes[pos] != varint::ERASED_BYTE {
            let (len, used) = varint::decode(&self.bytes[pos..])?;
            pos += used + len as usize;
        }
        Ok(RawRecordIter { bytes: self.bytes, pos })
    }
}

/// Iterates flat, untagged `varint(len) || body[len]` spans, as written by
/// [`crate::sector_chain::SectorChain::append_raw`].
pub struct RawRecordIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for RawRecordIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() || self.bytes[self.pos] == varint::ERASED_BYTE {
            return None;
        }
        let (len, used) = match varint::decode(&self.bytes[self.pos..]) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        let len = len as usize;
        let body_start = self.pos + used;
        let body_end = body_start + len;
        if body_end > self.bytes.len() || len == 0 {
            return Some(Err(Error::Corruption(CorruptionKind::BadVarint)));
        }
        self.pos = body_end;
        Some(Ok(&self.bytes[body_start..body_end]))
    }
}

pub struct RecordIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<(u8, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() || self.bytes[self.pos] == varint::ERASED_BYTE {
            return None;
        }
        let (len, used) = match varint::decode(&self.bytes[self.pos..]) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        let len = len as usize;
        let body_start = self.pos + used;
        let body_end = body_start + len;
        if body_end > self.bytes.len() || len == 0 {
            return Some(Err(Error::Corruption(CorruptionKind::BadVarint)));
        }
        self.pos = body_end;
        let tag = self.bytes[body_start];
        Some(Ok((tag, &self.bytes[body_start + 1..body_end])))
    }
}
