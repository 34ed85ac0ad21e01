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

//! Streams a file's bytes back out, regardless of whether they still
//! live inline in the directory chain or were promoted to a data chain.

use stratafs_device::{BufferPool, SectorAllocator, SectorMap};
use stratafs_err::Result;

use crate::data_chain::DataChain;
use crate::directory_chain::{DirectoryChain, FoundFile};

enum Storage<SM, BP, SA> {
    Inline { data: Vec<u8> },
    Chained { data_chain: DataChain<SM, BP, SA> },
}

pub struct FileReader<SM, BP, SA> {
    storage: Storage<SM, BP, SA>,
    cursor: u64,
}

impl<SM, BP, SA> FileReader<SM, BP, SA>
where
    SM: SectorMap + Clone,
    BP: BufferPool + Clone,
    SA: SectorAllocator + Clone,
{
    pub(crate) fn new(
        sector_map: SM,
        buffer_pool: BP,
        allocator: SA,
        mut directory: DirectoryChain<SM, BP, SA>,
        found: FoundFile,
    ) -> Result<Self> {
        let storage = if found.chain.valid() {
            Storage::Chained {
                data_chain: DataChain::open(sector_map, buffer_pool, allocator, found.chain)?,
            }
        } else {
            let mut data = Vec::with_capacity(found.directory_size as usize);
            directory.read_inline(found.id, |chunk| {
                data.extend_from_slice(chunk);
                Ok(())
            })?;
            Storage::Inline { data }
        };
        Ok(Self { storage, cursor: 0 })
    }

    pub fn length(&self) -> u64 {
        match &self.storage {
            Storage::Inline { data } => data.len() as u64,
            Storage::Chained { data_chain } => data_chain.cursor(),
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Reads up to `buf.len()` bytes starting at the reader's current
    /// cursor, advancing it by however many bytes were copied. Returns
    /// `0` once the end of the file is reached.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match &mut self.storage {
            Storage::Inline { data } => {
                let cursor = self.cursor as usize;
                if cursor >= data.len() {
                    0
                } else {
                    let take = buf.len().min(data.len() - cursor);
                    buf[..take].copy_from_slice(&data[cursor..cursor + take]);
                    take
                }
            }
            Storage::Chained { data_chain } => data_chain.read_at(self.cursor, buf)?,
        };
        self.cursor += n as u64;
        Ok(n)
    }
}
