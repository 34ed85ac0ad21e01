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

//! Appends bytes to a file, inline in the directory chain for as long as
//! they fit the room `find` reported, then promoted once to a dedicated
//! [`DataChain`] that every later write goes straight to.

use log::debug;
use stratafs_device::{BufferPool, SectorAllocator, SectorMap};
use stratafs_err::Result;

use crate::data_chain::DataChain;
use crate::directory_chain::{DirectoryChain, FileId, FoundFile};

pub struct FileAppender<SM, BP, SA> {
    directory: DirectoryChain<SM, BP, SA>,
    data_chain: Option<DataChain<SM, BP, SA>>,
    sector_map: SM,
    buffer_pool: BP,
    allocator: SA,
    id: FileId,
    directory_size: u32,
    directory_capacity: u32,
}

impl<SM, BP, SA> FileAppender<SM, BP, SA>
where
    SM: SectorMap + Clone,
    BP: BufferPool + Clone,
    SA: SectorAllocator + Clone,
{
    pub(crate) fn new(
        sector_map: SM,
        buffer_pool: BP,
        allocator: SA,
        directory: DirectoryChain<SM, BP, SA>,
        found: FoundFile,
    ) -> Result<Self> {
        let data_chain = if found.chain.valid() {
            Some(DataChain::open(
                sector_map.clone(),
                buffer_pool.clone(),
                allocator.clone(),
                found.chain,
            )?)
        } else {
            None
        };
        Ok(Self {
            directory,
            data_chain,
            sector_map,
            buffer_pool,
            allocator,
            id: found.id,
            directory_size: found.directory_size,
            directory_capacity: found.directory_capacity,
        })
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// Total bytes written to this file so far.
    pub fn length(&self) -> u64 {
        match &self.data_chain {
            Some(data_chain) => data_chain.cursor(),
            None => self.directory_size as u64,
        }
    }

    pub fn length_sectors(&self) -> u32 {
        self.data_chain.as_ref().map_or(0, DataChain::length_sectors)
    }

    pub fn has_chain(&self) -> bool {
        self.data_chain.is_some()
    }

    /// Appends `data`, promoting to a dedicated data chain the moment an
    /// inline write would exceed the room `find` measured for this file.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if let Some(data_chain) = self.data_chain.as_mut() {
            data_chain.write(data)?;
            self.directory.file_chain(self.id, data_chain.head_tail())?;
            return Ok(());
        }

        let prospective = self.directory_size as u64 + data.len() as u64;
        if prospective > self.directory_capacity as u64 {
            return self.promote(data);
        }

        self.directory.file_data(self.id, data)?;
        self.directory_size += data.len() as u32;
        Ok(())
    }

    fn promote(&mut self, new_data: &[u8]) -> Result<()> {
        debug!("promoting file id {:#x} to a data chain", self.id);
        let mut data_chain = DataChain::create(self.sector_map.clone(), self.buffer_pool.clone(), self.allocator.clone())?;

        let mut prior = Vec::new();
        self.directory.read_inline(self.id, |chunk| {
            prior.extend_from_slice(chunk);
            Ok(())
        })?;
        if !prior.is_empty() {
            data_chain.write(&prior)?;
        }
        data_chain.write(new_data)?;

        self.directory.file_chain(self.id, data_chain.head_tail())?;
        self.directory_size = 0;
        self.data_chain = Some(data_chain);
        Ok(())
    }

    /// Removes the file's contents without removing its name: appends a
    /// fresh tombstone `FileData` record, same as `unlink` does for the
    /// data half of a name.
    pub fn truncate(&mut self) -> Result<()> {
        self.directory.file_data(self.id, &[])?;
        self.directory_size = 0;
        self.directory_capacity = 0;
        self.data_chain = None;
        Ok(())
    }

    /// Every `write` already journals and flushes as it goes, so there is
    /// nothing buffered here; `flush` exists only so callers that model
    /// writers with an explicit flush/close step (spec §4.6) have one to
    /// call.
    pub fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}
