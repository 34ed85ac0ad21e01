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

//! A flat-namespace, append-only filesystem for raw flash, built on a
//! log-structured directory chain and chained sector storage (see
//! `SPEC_FULL.md`). Everything below this module's `Filesystem` facade
//! is generic over the three collaborators the medium is expected to
//! supply: a [`SectorMap`], a [`SectorAllocator`] and a [`BufferPool`].
//! `stratafs_ram` provides an in-memory triple for tests and demos;
//! real hardware supplies its own.

pub mod appender;
pub mod buffer;
pub mod data_chain;
pub mod directory_chain;
pub mod reader;
pub mod record;
pub mod sector_chain;
pub mod varint;

pub use stratafs_device as device;
pub use stratafs_err as err;

use log::{debug, warn};
use stratafs_device::{BufferPool, SectorAllocator, SectorMap};
use stratafs_err::{CorruptionKind, Error, Result};

use crate::appender::FileAppender;
use crate::directory_chain::{DirectoryChain, FileId, FoundFile, OpenFileConfig};
use crate::reader::FileReader;

/// Construction-time limits the original hardcodes as compile-time
/// constants (`MaximumNameLength` and friends). Unlike the on-media
/// layout, these never appear in the log itself — they only bound what
/// `Filesystem` is willing to accept from a caller.
#[derive(Clone, Debug)]
pub struct FsConfig {
    /// Longest `name` byte length `touch`/`unlink`/`find` will accept.
    pub max_name_len: usize,
    /// Longest attribute payload `file_attribute` will accept.
    pub max_attribute_len: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            max_name_len: 255,
            max_attribute_len: u16::MAX as usize,
        }
    }
}

/// The public surface: mount/format the root directory chain, resolve
/// names to [`FoundFile`] views, and open appenders/readers against
/// them. A single `Filesystem` handle owns the collaborators for the
/// lifetime of a mount; per spec §5 there is exactly one writer.
pub struct Filesystem<SM, BP, SA> {
    sector_map: SM,
    buffer_pool: BP,
    allocator: SA,
    config: FsConfig,
    read_only: bool,
}

impl<SM, BP, SA> Filesystem<SM, BP, SA>
where
    SM: SectorMap + Clone,
    BP: BufferPool + Clone,
    SA: SectorAllocator + Clone,
{
    pub fn new(sector_map: SM, buffer_pool: BP, allocator: SA, config: FsConfig) -> Self {
        Self {
            sector_map,
            buffer_pool,
            allocator,
            config,
            read_only: false,
        }
    }

    /// Builds a handle onto the root directory chain and mounts it,
    /// replaying sector 0 forward so the chain's tail is loaded before the
    /// caller appends or walks it. `format`/`mount` bypass this (they build
    /// their own local chain and call `format`/`mount` on it directly); every
    /// other operation goes through here since `Filesystem` itself keeps no
    /// mounted chain across calls.
    fn directory(&mut self) -> Result<DirectoryChain<SM, BP, SA>> {
        let mut dir = DirectoryChain::new(self.sector_map.clone(), self.buffer_pool.clone(), self.allocator.clone());
        let result = dir.mount();
        self.note(&result);
        result?;
        Ok(dir)
    }

    /// Once any call observes `Error::Corruption`, the mount is held
    /// read-only for everything that follows (spec §7: "Corruption is
    /// fatal for the current mount").
    fn guard(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::Corruption(CorruptionKind::MountReadOnly));
        }
        Ok(())
    }

    fn note<T>(&mut self, result: &Result<T>) {
        if let Err(Error::Corruption(kind)) = result {
            warn!("corruption observed ({kind}), mount is now read-only");
            self.read_only = true;
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.len() > self.config.max_name_len {
            return Err(Error::InvalidArgument("name exceeds max_name_len"));
        }
        Ok(())
    }

    /// Writes a fresh root directory chain header into sector 0, which
    /// the caller must have ensured is erased (a brand new medium, or
    /// one the caller has otherwise wiped).
    pub fn format(&mut self) -> Result<()> {
        let mut dir = DirectoryChain::new(self.sector_map.clone(), self.buffer_pool.clone(), self.allocator.clone());
        let result = dir.format();
        self.note(&result);
        debug!("formatted root directory chain");
        result
    }

    /// Loads the root directory chain from sector 0.
    pub fn mount(&mut self) -> Result<()> {
        let mut dir = DirectoryChain::new(self.sector_map.clone(), self.buffer_pool.clone(), self.allocator.clone());
        let result = dir.mount();
        self.note(&result);
        result
    }

    /// Binds `name` to a fresh file id. Calling this again for a name
    /// that was previously `unlink`ed resurrects it (spec §9): the new
    /// `FileEntry` simply out-dates the tombstone in walk order.
    pub fn touch(&mut self, name: &str) -> Result<FileId> {
        self.guard()?;
        self.check_name(name)?;
        let mut dir = self.directory()?;
        let result = dir.touch(name);
        self.note(&result);
        result
    }

    /// Tombstones `name`'s current data. The name itself (its most
    /// recent `FileEntry`) is left in the log; a later `touch` of the
    /// same name reuses it.
    pub fn unlink(&mut self, name: &str) -> Result<()> {
        self.guard()?;
        self.check_name(name)?;
        let mut dir = self.directory()?;
        let result = dir.unlink(name);
        self.note(&result);
        result
    }

    /// A single full walk of the directory chain looking for `name`,
    /// filling in any attributes requested by `cfg`. `Ok(None)` means
    /// absent, which per spec §7 is a value, not an error.
    pub fn find(&mut self, name: &str, cfg: &OpenFileConfig) -> Result<Option<FoundFile>> {
        self.guard()?;
        self.check_name(name)?;
        let mut dir = self.directory()?;
        let result = dir.find(name, cfg);
        self.note(&result);
        result
    }

    /// Appends a typed attribute to `id`. Last writer wins on replay
    /// (spec §4.4).
    pub fn file_attribute(&mut self, id: FileId, attr_type: u8, value: &[u8]) -> Result<()> {
        self.guard()?;
        if value.len() > self.config.max_attribute_len {
            return Err(Error::InvalidArgument("attribute exceeds max_attribute_len"));
        }
        let mut dir = self.directory()?;
        let result = dir.file_attribute(id, attr_type, value);
        self.note(&result);
        result
    }

    /// Opens an appender for a file previously resolved with [`find`](Self::find).
    pub fn open_appender(&mut self, found: FoundFile) -> Result<FileAppender<SM, BP, SA>> {
        self.guard()?;
        let dir = self.directory()?;
        let result = FileAppender::new(
            self.sector_map.clone(),
            self.buffer_pool.clone(),
            self.allocator.clone(),
            dir,
            found,
        );
        self.note(&result);
        result
    }

    /// Opens a reader for a file previously resolved with [`find`](Self::find).
    pub fn open_reader(&mut self, found: FoundFile) -> Result<FileReader<SM, BP, SA>> {
        self.guard()?;
        let dir = self.directory()?;
        let result = FileReader::new(
            self.sector_map.clone(),
            self.buffer_pool.clone(),
            self.allocator.clone(),
            dir,
            found,
        );
        self.note(&result);
        result
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}
