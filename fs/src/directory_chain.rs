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

//! The root directory: a chain of sectors holding an append-only journal
//! of file entries, data fragments, attributes and tombstones. Never
//! rewrites a record in place — renaming a file's data, growing it, or
//! deleting it is always one more record appended at the tail.

use log::debug;
use stratafs_device::{BufferPool, SectorAllocator, SectorMap, INVALID_SECTOR};
use stratafs_err::{CorruptionKind, Error, Result};
use zerocopy::{FromBytes, IntoBytes};

use crate::buffer::DelimitedBuffer;
use crate::record::{
    classify_file_data, EntryTag, FileAttributeBody, FileDataBody, FileDataKind, FileEntryBody, HeadTail,
    SectorKind,
};
use crate::sector_chain::SectorChain;

/// Sector reserved by convention for the root directory chain's head.
pub const ROOT_DIRECTORY_HEAD: u32 = 0;

pub type FileId = u32;

pub const INVALID_FILE_ID: FileId = u32::MAX;

/// Stable, deterministic id derived from a file's name. Two directory
/// entries with the same name always hash to the same id, which is what
/// lets `touch` after `unlink` resurrect a name: the tombstone and the
/// new entry both carry the id `make_file_id` would compute from that
/// name, so `find` re-associates them without needing a separate lookup
/// table.
pub fn make_file_id(name: &str) -> FileId {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    if hash == INVALID_FILE_ID {
        hash ^ 1
    } else {
        hash
    }
}

/// An attribute a caller wants filled in by `find`.
#[derive(Clone, Debug)]
pub struct AttributeRequest {
    pub attr_type: u8,
    pub size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct OpenFileConfig {
    pub attributes: Vec<AttributeRequest>,
}

#[derive(Clone, Debug)]
pub struct FoundAttribute {
    pub attr_type: u8,
    pub value: Vec<u8>,
}

/// What `find` knows about a name after walking the directory chain:
/// its id, whether its data has been promoted to a chain, how much
/// inline data it has accumulated, and any requested attributes.
#[derive(Clone, Debug)]
pub struct FoundFile {
    pub id: FileId,
    pub chain: HeadTail,
    pub directory_size: u32,
    pub directory_capacity: u32,
    pub attributes: Vec<FoundAttribute>,
}

impl Default for FoundFile {
    fn default() -> Self {
        Self {
            id: INVALID_FILE_ID,
            chain: HeadTail::INVALID,
            directory_size: 0,
            directory_capacity: 0,
            attributes: Vec::new(),
        }
    }
}

impl FoundFile {
    pub fn exists(&self) -> bool {
        self.id != INVALID_FILE_ID
    }
}

pub(crate) struct DirectoryChain<SM, BP, SA> {
    chain: SectorChain<SM, BP, SA>,
}

impl<SM, BP, SA> DirectoryChain<SM, BP, SA>
where
    SM: SectorMap + Clone,
    BP: BufferPool + Clone,
    SA: SectorAllocator + Clone,
{
    pub fn new(sector_map: SM, buffer_pool: BP, allocator: SA) -> Self {
        Self {
            chain: SectorChain::new(
                sector_map,
                buffer_pool,
                allocator,
                SectorKind::Directory,
                ROOT_DIRECTORY_HEAD,
                INVALID_SECTOR,
            ),
        }
    }

    pub fn mount(&mut self) -> Result<()> {
        self.chain.mount()
    }

    pub fn format(&mut self) -> Result<()> {
        self.chain.format(0)
    }

    pub fn allocator_mut(&mut self) -> &mut SA {
        self.chain.allocator_mut()
    }

    fn append(&mut self, tag: EntryTag, body_len: usize, fill: impl FnOnce(&mut [u8])) -> Result<()> {
        self.chain.back_to_tail()?;
        self.chain.append_record(0, tag, body_len, fill)?;
        self.chain.flush()
    }

    pub fn touch(&mut self, name: &str) -> Result<FileId> {
        let id = make_file_id(name);
        let body_len = core::mem::size_of::<FileEntryBody>() + name.len();
        self.append(EntryTag::FileEntry, body_len, |rec| {
            let header_len = core::mem::size_of::<FileEntryBody>();
            let header = FileEntryBody { id: id.into() };
            rec[..header_len].copy_from_slice(header.as_bytes());
            rec[header_len..].copy_from_slice(name.as_bytes());
        })?;
        debug!("touch {name} -> id {id:#x}");
        Ok(id)
    }

    pub fn unlink(&mut self, name: &str) -> Result<()> {
        let id = make_file_id(name);
        self.write_tombstone(id)
    }

    fn write_tombstone(&mut self, id: FileId) -> Result<()> {
        let body_len = core::mem::size_of::<FileDataBody>();
        self.append(EntryTag::FileData, body_len, |rec| {
            let body = FileDataBody {
                id: id.into(),
                size: 0u32.into(),
            };
            rec.copy_from_slice(body.as_bytes());
        })
    }

    pub fn file_data(&mut self, id: FileId, data: &[u8]) -> Result<()> {
        let body_len = core::mem::size_of::<FileDataBody>() + data.len();
        self.append(EntryTag::FileData, body_len, |rec| {
            let header_len = core::mem::size_of::<FileDataBody>();
            let header = FileDataBody {
                id: id.into(),
                size: (data.len() as u32).into(),
            };
            rec[..header_len].copy_from_slice(header.as_bytes());
            rec[header_len..].copy_from_slice(data);
        })
    }

    pub fn file_chain(&mut self, id: FileId, chain: HeadTail) -> Result<()> {
        let body_len = core::mem::size_of::<FileDataBody>() + 8;
        self.append(EntryTag::FileData, body_len, |rec| {
            let header_len = core::mem::size_of::<FileDataBody>();
            let header = FileDataBody {
                id: id.into(),
                size: 0u32.into(),
            };
            rec[..header_len].copy_from_slice(header.as_bytes());
            rec[header_len..header_len + 4].copy_from_slice(&chain.head.to_le_bytes());
            rec[header_len + 4..].copy_from_slice(&chain.tail.to_le_bytes());
        })
    }

    pub fn file_attribute(&mut self, id: FileId, attr_type: u8, value: &[u8]) -> Result<()> {
        let body_len = core::mem::size_of::<FileAttributeBody>() + value.len();
        self.append(EntryTag::FileAttribute, body_len, |rec| {
            let header_len = core::mem::size_of::<FileAttributeBody>();
            let header = FileAttributeBody {
                id: id.into(),
                attr_type,
                size: (value.len() as u16).into(),
            };
            rec[..header_len].copy_from_slice(header.as_bytes());
            rec[header_len..].copy_from_slice(value);
        })
    }

    /// Walks the whole chain from head to tail looking for `name`,
    /// resolving its current id, data location and requested attributes.
    ///
    /// `directory_capacity` is recomputed from the current sector's size
    /// on every single record visited, exactly as `directory_chain.cpp`
    /// does — it is not a running total across the walk, only the last
    /// matching inline write's effect on it survives. A tombstone for the
    /// matched id resets every field (id included), so a later `FileEntry`
    /// with the same name re-establishes the file from scratch, which is
    /// what lets `touch` resurrect a name after `unlink`.
    pub fn find(&mut self, name: &str, cfg: &OpenFileConfig) -> Result<Option<FoundFile>> {
        let mut found = FoundFile {
            attributes: cfg
                .attributes
                .iter()
                .map(|a| FoundAttribute {
                    attr_type: a.attr_type,
                    value: vec![0u8; a.size],
                })
                .collect(),
            ..FoundFile::default()
        };
        let sector_size = self.chain.sector_size_hint();
        let has_attrs = !cfg.attributes.is_empty();

        self.chain.walk(|sector_bytes| {
            let view = DelimitedBuffer::load_ro(sector_bytes)?;
            for record in view.iter() {
                let (tag, body) = record?;
                match EntryTag::from_u8(tag)? {
                    EntryTag::FileEntry => {
                        let header_len = core::mem::size_of::<FileEntryBody>();
                        if body.len() < header_len {
                            return Err(Error::Corruption(CorruptionKind::UnknownFileId));
                        }
                        let entry = FileEntryBody::read_from_bytes(&body[..header_len])
                            .map_err(|_| Error::Corruption(CorruptionKind::UnknownFileId))?;
                        if let Ok(entry_name) = core::str::from_utf8(&body[header_len..]) {
                            if entry_name == name {
                                found.id = entry.id.get();
                                found.directory_capacity = (sector_size / 2) as u32;
                            }
                        }
                    }
                    EntryTag::FileData => {
                        let header_len = core::mem::size_of::<FileDataBody>();
                        if body.len() < header_len {
                            return Err(Error::Corruption(CorruptionKind::UnknownFileId));
                        }
                        let fd = FileDataBody::read_from_bytes(&body[..header_len])
                            .map_err(|_| Error::Corruption(CorruptionKind::UnknownFileId))?;
                        if fd.id.get() == found.id {
                            // Recomputed fresh from the running `directory_size` on every
                            // matching record, per spec §4.4 step 4 — not just decremented
                            // by the current record's own size, so an interleaved
                            // non-matching record (another file's entry, an attribute)
                            // can't leave a stale, too-generous capacity behind.
                            found.directory_capacity = (sector_size / 2) as u32;
                            match classify_file_data(&fd, &body[header_len..])? {
                                FileDataKind::Chained { head, tail } => {
                                    found.directory_size = 0;
                                    found.chain = HeadTail { head, tail };
                                }
                                FileDataKind::Tombstone => {
                                    let attributes = core::mem::take(&mut found.attributes);
                                    found = FoundFile {
                                        attributes,
                                        ..FoundFile::default()
                                    };
                                }
                                FileDataKind::Inline(data) => {
                                    found.directory_size += data.len() as u32;
                                    found.directory_capacity =
                                        found.directory_capacity.saturating_sub(found.directory_size);
                                }
                            }
                        }
                    }
                    EntryTag::FileAttribute => {
                        if has_attrs {
                            let header_len = core::mem::size_of::<FileAttributeBody>();
                            if body.len() < header_len {
                                return Err(Error::Corruption(CorruptionKind::UnknownFileId));
                            }
                            let fa = FileAttributeBody::read_from_bytes(&body[..header_len])
                                .map_err(|_| Error::Corruption(CorruptionKind::UnknownFileId))?;
                            if fa.id.get() == found.id {
                                let payload = &body[header_len..];
                                for wanted in found.attributes.iter_mut() {
                                    if wanted.attr_type == fa.attr_type && payload.len() == wanted.value.len() {
                                        wanted.value.copy_from_slice(payload);
                                    }
                                }
                            }
                        }
                    }
                    EntryTag::SectorHeader => {}
                }
            }
            Ok(true)
        })?;

        if !found.exists() {
            return Ok(None);
        }
        Ok(Some(found))
    }

    /// Concatenates every inline `FileData` record matching `id`, in
    /// order, passing each fragment to `on_data`. Used by the reader
    /// when a file's data never got promoted to its own data chain.
    pub fn read_inline(&mut self, id: FileId, mut on_data: impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        self.chain.walk(|sector_bytes| {
            let view = DelimitedBuffer::load_ro(sector_bytes)?;
            for record in view.iter() {
                let (tag, body) = record?;
                if EntryTag::from_u8(tag)? != EntryTag::FileData {
                    continue;
                }
                let header_len = core::mem::size_of::<FileDataBody>();
                if body.len() < header_len {
                    return Err(Error::Corruption(CorruptionKind::UnknownFileId));
                }
                let fd = FileDataBody::read_from_bytes(&body[..header_len])
                    .map_err(|_| Error::Corruption(CorruptionKind::UnknownFileId))?;
                if fd.id.get() == id {
                    if let FileDataKind::Inline(data) = classify_file_data(&fd, &body[header_len..])? {
                        on_data(data)?;
                    }
                }
            }
            Ok(true)
        })
    }
}
