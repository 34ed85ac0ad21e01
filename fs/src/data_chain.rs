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

//! A chain of sectors holding one file's data once it has outgrown what
//! the directory chain is willing to carry inline. Each sector carries
//! the same `SectorHeader` record every chain starts with; everything
//! after it is a flat byte region (SPEC_FULL.md §4.5) — no file-entry or
//! attribute records, no per-span tag, just a run of
//! `varint(len) || bytes[len]` spans so a cold mount can recover each
//! sector's exact byte count without needing to scan for an end marker.

use stratafs_device::{BufferPool, SectorAllocator, SectorMap, INVALID_SECTOR};
use stratafs_err::{CorruptionKind, Error, Result};

use crate::buffer::DelimitedBuffer;
use crate::record::{HeadTail, SectorKind};
use crate::sector_chain::SectorChain;

pub(crate) struct DataChain<SM, BP, SA> {
    chain: SectorChain<SM, BP, SA>,
    length: u64,
}

impl<SM, BP, SA> DataChain<SM, BP, SA>
where
    SM: SectorMap + Clone,
    BP: BufferPool + Clone,
    SA: SectorAllocator + Clone,
{
    /// Allocates a brand new, single-sector chain.
    pub fn create(sector_map: SM, buffer_pool: BP, mut allocator: SA) -> Result<Self> {
        let head = allocator.allocate()?;
        let mut chain = SectorChain::new(sector_map, buffer_pool, allocator, SectorKind::Data, head, INVALID_SECTOR);
        chain.format(0)?;
        Ok(Self { chain, length: 0 })
    }

    /// Mounts a chain whose `{head, tail}` is already known, from a
    /// file's directory entry, recomputing its logical length by
    /// summing every record's payload.
    pub fn open(sector_map: SM, buffer_pool: BP, allocator: SA, chain: HeadTail) -> Result<Self> {
        if !chain.valid() {
            return Err(Error::InvalidArgument("data chain head/tail is not valid"));
        }
        let mut sector_chain = SectorChain::new(sector_map, buffer_pool, allocator, SectorKind::Data, chain.head, chain.tail);
        sector_chain.mount()?;
        let mut length: u64 = 0;
        sector_chain.walk(|sector_bytes| {
            let view = DelimitedBuffer::load_ro(sector_bytes)?;
            for span in view.raw_iter_after_header()? {
                length += span?.len() as u64;
            }
            Ok(true)
        })?;
        Ok(Self { chain: sector_chain, length })
    }

    pub fn head_tail(&self) -> HeadTail {
        HeadTail {
            head: self.chain.head(),
            tail: self.chain.tail(),
        }
    }

    pub fn length_sectors(&self) -> u32 {
        self.chain.length_sectors()
    }

    pub fn cursor(&self) -> u64 {
        self.length
    }

    /// Appends `data` to the end of the chain, splitting across sector
    /// boundaries as needed.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.chain.back_to_tail()?;
        let mut remaining = data;
        while !remaining.is_empty() {
            let mut room = self.chain.tail_room()?;
            if room == 0 {
                self.chain.grow_tail(self.length)?;
                room = self.chain.tail_room()?;
                if room == 0 {
                    return Err(Error::Corruption(CorruptionKind::DanglingChain));
                }
            }
            let take = remaining.len().min(room);
            self.chain.append_raw(self.length, take, |rec| {
                rec.copy_from_slice(&remaining[..take]);
            })?;
            self.length += take as u64;
            remaining = &remaining[take..];
        }
        self.chain.flush()
    }

    /// Reads `buf.len()` bytes starting at byte offset `offset` into the
    /// file's logical stream, stepping sector-by-sector using each
    /// sector's own leading offset to locate the right one in O(sectors).
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.length {
            return Ok(0);
        }
        let to_read = buf.len().min((self.length - offset) as usize);
        let mut filled = 0usize;
        let mut want = offset;

        self.chain.back_to_head()?;
        loop {
            let done = {
                let sector_bytes = self.chain.current_buffer()?;
                let view = DelimitedBuffer::load_ro(sector_bytes)?;
                let sector_base = view.chain_offset();
                let mut sector_pos = sector_base;
                for span in view.raw_iter_after_header()? {
                    let body = span?;
                    let record_end = sector_pos + body.len() as u64;
                    if filled < to_read && want < record_end && want >= sector_pos {
                        let skip = (want - sector_pos) as usize;
                        let available = body.len() - skip;
                        let take = available.min(to_read - filled);
                        buf[filled..filled + take].copy_from_slice(&body[skip..skip + take]);
                        filled += take;
                        want += take as u64;
                    }
                    sector_pos = record_end;
                }
                filled >= to_read
            };
            if done {
                break;
            }
            if !self.chain.forward()? {
                break;
            }
        }
        Ok(filled)
    }
}
