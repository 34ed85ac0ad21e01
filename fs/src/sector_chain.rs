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

//! The generic back-linked, forward-appended log of sectors that both
//! the directory chain and the data chain are built on.
//!
//! Each sector's header carries only a back-link (`prev_sector`), the
//! same as `sector_chain.h`. Forward traversal is therefore either a
//! backward walk from an already-known tail (the normal case: a file's
//! data chain always has its `{head, tail}` handed to us from its
//! directory entry) or, when only the head is known (mounting the root
//! directory chain cold), a bounded scan of the medium looking for the
//! sector whose back-link matches. Either way the result is cached once
//! as `sequence`, so repeated `forward()` calls during a session are
//! O(1).

use log::debug;
use stratafs_device::{BufferPool, SectorAllocator, SectorMap, INVALID_SECTOR};
use stratafs_err::{CorruptionKind, Error, Result};
use zerocopy::{FromBytes, IntoBytes};

use crate::buffer::DelimitedBuffer;
use crate::record::{EntryTag, SectorHeaderBody, SectorKind};

pub(crate) struct SectorChain<SM, BP, SA> {
    sector_map: SM,
    buffer_pool: BP,
    allocator: SA,
    kind: SectorKind,
    head: u32,
    tail: u32,
    sequence: Vec<u32>,
    cursor_index: usize,
    buffer: Option<BP::Buffer>,
    dirty: bool,
}

impl<SM, BP, SA> SectorChain<SM, BP, SA>
where
    SM: SectorMap + Clone,
    BP: BufferPool + Clone,
    SA: SectorAllocator + Clone,
{
    pub fn new(sector_map: SM, buffer_pool: BP, allocator: SA, kind: SectorKind, head: u32, tail: u32) -> Self {
        Self {
            sector_map,
            buffer_pool,
            allocator,
            kind,
            head,
            tail,
            sequence: Vec::new(),
            cursor_index: 0,
            buffer: None,
            dirty: false,
        }
    }

    pub fn allocator(&self) -> &SA {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut SA {
        &mut self.allocator
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn tail(&self) -> u32 {
        self.tail
    }

    pub fn length_sectors(&self) -> u32 {
        self.sequence.len() as u32
    }

    pub fn current_sector(&self) -> u32 {
        self.sequence.get(self.cursor_index).copied().unwrap_or(INVALID_SECTOR)
    }

    pub fn at_tail(&self) -> bool {
        !self.sequence.is_empty() && self.cursor_index == self.sequence.len() - 1
    }

    fn sector_size(&self) -> usize {
        self.buffer_pool.sector_size()
    }

    fn read_sector(&self, sector: u32) -> Result<BP::Buffer> {
        let mut buf = self.buffer_pool.acquire();
        self.sector_map.read(sector, &mut buf)?;
        Ok(buf)
    }

    fn header_of(buf: &[u8], expected: SectorKind) -> Result<SectorHeaderBody> {
        let db = DelimitedBuffer::load_ro(buf)?;
        let mut it = db.iter();
        let (tag, body) = it
            .next()
            .ok_or(Error::Corruption(CorruptionKind::UnexpectedSectorKind))??;
        if EntryTag::from_u8(tag)? != EntryTag::SectorHeader {
            return Err(Error::Corruption(CorruptionKind::UnexpectedSectorKind));
        }
        let header = SectorHeaderBody::read_from_bytes(body)
            .map_err(|_| Error::Corruption(CorruptionKind::UnexpectedSectorKind))?;
        if header.kind()? != expected {
            return Err(Error::Corruption(CorruptionKind::UnexpectedSectorKind));
        }
        Ok(header)
    }

    fn walk_backward_from_tail(&self) -> Result<Vec<u32>> {
        let mut sequence = vec![self.tail];
        let mut current = self.tail;
        while current != self.head {
            let buf = self.read_sector(current)?;
            let header = Self::header_of(&buf, self.kind)?;
            let prev = header.prev_sector.get();
            if prev == INVALID_SECTOR {
                return Err(Error::Corruption(CorruptionKind::DanglingChain));
            }
            sequence.push(prev);
            current = prev;
        }
        sequence.reverse();
        Ok(sequence)
    }

    /// Used only to rediscover the root directory chain's tail at a cold
    /// mount, when nothing external remembers it (see `SPEC_FULL.md` §9).
    /// Bounded by `SectorMap::sector_count`.
    fn discover_forward_by_scan(&self) -> Result<Vec<u32>> {
        let mut sequence = vec![self.head];
        let mut current = self.head;
        let total = self.sector_map.sector_count();
        loop {
            let mut next = None;
            for candidate in 0..total {
                if candidate == current || sequence.contains(&candidate) {
                    continue;
                }
                let buf = match self.read_sector(candidate) {
                    Ok(buf) => buf,
                    Err(_) => continue,
                };
                let header = match Self::header_of(&buf, self.kind) {
                    Ok(h) => h,
                    Err(_) => continue,
                };
                if header.prev_sector.get() == current {
                    next = Some(candidate);
                    break;
                }
            }
            match next {
                Some(sector) => {
                    sequence.push(sector);
                    current = sector;
                }
                None => break,
            }
        }
        debug!(
            "discovered {} sector chain by scanning {} candidates",
            sequence.len(),
            total
        );
        Ok(sequence)
    }

    fn build_sequence(&mut self) -> Result<()> {
        self.sequence = if self.tail != INVALID_SECTOR {
            self.walk_backward_from_tail()?
        } else {
            let sequence = self.discover_forward_by_scan()?;
            self.tail = *sequence.last().ok_or(Error::Corruption(CorruptionKind::DanglingChain))?;
            sequence
        };
        Ok(())
    }

    fn load_at(&mut self, index: usize) -> Result<()> {
        let sector = self.sequence[index];
        let buf = self.read_sector(sector)?;
        Self::header_of(&buf, self.kind)?;
        self.buffer = Some(buf);
        self.cursor_index = index;
        self.dirty = false;
        Ok(())
    }

    /// Loads the head sector, validating the chain's existence.
    pub fn mount(&mut self) -> Result<()> {
        self.build_sequence()?;
        self.load_at(0)
    }

    /// Writes a fresh header into `self.head`, which the caller must
    /// already have allocated (erased). Becomes the chain's sole sector.
    pub fn format(&mut self, leading_offset: u64) -> Result<()> {
        let mut buf = self.buffer_pool.acquire();
        Self::write_header(&mut buf, INVALID_SECTOR, self.kind, leading_offset)?;
        self.sector_map.write(self.head, &buf)?;
        self.tail = self.head;
        self.sequence = vec![self.head];
        self.buffer = Some(buf);
        self.cursor_index = 0;
        self.dirty = false;
        Ok(())
    }

    fn write_header(buf: &mut [u8], prev_sector: u32, kind: SectorKind, leading_offset: u64) -> Result<()> {
        let mut db = DelimitedBuffer::empty(buf, leading_offset);
        let header = SectorHeaderBody::new(prev_sector, kind);
        let rec = db.reserve(1 + core::mem::size_of::<SectorHeaderBody>())?;
        rec[0] = EntryTag::SectorHeader as u8;
        rec[1..].copy_from_slice(header.as_bytes());
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            let buf = self
                .buffer
                .as_ref()
                .ok_or(Error::Corruption(CorruptionKind::DanglingChain))?;
            self.sector_map.write(self.current_sector(), buf)?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn back_to_head(&mut self) -> Result<()> {
        self.flush()?;
        self.load_at(0)
    }

    pub fn back_to_tail(&mut self) -> Result<()> {
        self.flush()?;
        self.load_at(self.sequence.len() - 1)
    }

    /// Advances to the next sector in the chain. `Ok(false)` once the
    /// tail has already been reached.
    pub fn forward(&mut self) -> Result<bool> {
        if self.at_tail() {
            return Ok(false);
        }
        self.flush()?;
        self.load_at(self.cursor_index + 1)?;
        Ok(true)
    }

    /// Allocates a new sector, links it behind the current tail, and
    /// makes it the loaded sector.
    pub fn grow_tail(&mut self, leading_offset: u64) -> Result<()> {
        self.flush()?;
        let new_sector = self.allocator.allocate()?;
        let mut buf = self.buffer_pool.acquire();
        Self::write_header(&mut buf, self.tail, self.kind, leading_offset)?;
        self.sector_map.write(new_sector, &buf)?;
        self.tail = new_sector;
        self.sequence.push(new_sector);
        self.cursor_index = self.sequence.len() - 1;
        self.buffer = Some(buf);
        self.dirty = false;
        debug!("chain grew to sector {new_sector}, length {}", self.sequence.len());
        Ok(())
    }

    /// Ensures the loaded (tail) sector has room for a `length`-byte
    /// record, growing the chain first if it doesn't.
    pub fn prepare(&mut self, length: usize, leading_offset_if_grown: u64) -> Result<()> {
        debug_assert!(self.at_tail(), "prepare called while not positioned at the tail");
        let fits = {
            let buf = self
                .buffer
                .as_mut()
                .ok_or(Error::Corruption(CorruptionKind::DanglingChain))?;
            DelimitedBuffer::load(buf)?.room_for(length)
        };
        if !fits {
            self.grow_tail(leading_offset_if_grown)?;
        }
        Ok(())
    }

    /// Appends a tagged record to the currently loaded tail sector,
    /// growing the chain first if there isn't room.
    pub fn append_record(
        &mut self,
        leading_offset_if_grown: u64,
        tag: EntryTag,
        body_len: usize,
        fill: impl FnOnce(&mut [u8]),
    ) -> Result<()> {
        self.prepare(1 + body_len, leading_offset_if_grown)?;
        {
            let buf = self
                .buffer
                .as_mut()
                .ok_or(Error::Corruption(CorruptionKind::DanglingChain))?;
            let mut db = DelimitedBuffer::load(buf)?;
            let rec = db.reserve(1 + body_len)?;
            rec[0] = tag as u8;
            fill(&mut rec[1..]);
        }
        self.dirty = true;
        Ok(())
    }

    /// Appends a raw, untagged length-prefixed span to the currently
    /// loaded tail sector, growing the chain first if there isn't room.
    /// Unlike [`Self::append_record`] this writes no entry tag — used by
    /// the data chain, whose payload is a flat run of file bytes with no
    /// need to disambiguate record kinds within a sector.
    pub fn append_raw(
        &mut self,
        leading_offset_if_grown: u64,
        body_len: usize,
        fill: impl FnOnce(&mut [u8]),
    ) -> Result<()> {
        self.prepare(body_len, leading_offset_if_grown)?;
        {
            let buf = self
                .buffer
                .as_mut()
                .ok_or(Error::Corruption(CorruptionKind::DanglingChain))?;
            let mut db = DelimitedBuffer::load(buf)?;
            let rec = db.reserve(body_len)?;
            fill(rec);
        }
        self.dirty = true;
        Ok(())
    }

    /// Visits every sector from head to tail, calling `f` with the raw
    /// sector bytes (header included; callers skip it via
    /// `DelimitedBuffer::load_ro`'s iterator, which starts after the
    /// offset varint, or explicitly skip the first record). Stops early
    /// when `f` returns `Ok(false)`.
    pub fn walk(&mut self, mut f: impl FnMut(&[u8]) -> Result<bool>) -> Result<()> {
        self.back_to_head()?;
        loop {
            let keep_going = f(self.current_buffer()?)?;
            if !keep_going {
                break;
            }
            if !self.forward()? {
                break;
            }
        }
        Ok(())
    }

    /// A conservative estimate of how many more raw payload bytes a
    /// single additional record could hold in the currently loaded
    /// sector, accounting for that record's own length prefix.
    pub fn tail_room(&mut self) -> Result<usize> {
        let buf = self
            .buffer
            .as_mut()
            .ok_or(Error::Corruption(CorruptionKind::DanglingChain))?;
        let remaining = DelimitedBuffer::load(buf)?.remaining();
        Ok(remaining.saturating_sub(crate::varint::MAX_LEN))
    }

    pub fn current_buffer(&self) -> Result<&[u8]> {
        self.buffer
            .as_deref()
            .ok_or(Error::Corruption(CorruptionKind::DanglingChain))
    }

    pub fn sector_size_hint(&self) -> usize {
        self.sector_size()
    }
}
