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

//! The tagged records carried inside a [`crate::buffer::DelimitedBuffer`].
//!
//! Every record's first payload byte is an [`EntryTag`]; what follows is a
//! fixed-width body (read in place via `zerocopy`) and, for some tags, a
//! trailing variable-length region whose length is implied by the
//! record's own length prefix rather than stored again.

use stratafs_device::INVALID_SECTOR;
use stratafs_err::{CorruptionKind, Error, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Which kind of sector a [`SectorHeaderBody`] belongs to, i.e. which
/// chain is allowed to mount it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SectorKind {
    Directory = 1,
    Data = 2,
}

impl SectorKind {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(SectorKind::Directory),
            2 => Ok(SectorKind::Data),
            _ => Err(Error::Corruption(CorruptionKind::UnexpectedSectorKind)),
        }
    }
}

/// The tag every record leads with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryTag {
    SectorHeader = 1,
    FileEntry = 2,
    FileAttribute = 3,
    FileData = 4,
}

impl EntryTag {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(EntryTag::SectorHeader),
            2 => Ok(EntryTag::FileEntry),
            3 => Ok(EntryTag::FileAttribute),
            4 => Ok(EntryTag::FileData),
            _ => Err(Error::Corruption(CorruptionKind::UnexpectedSectorKind)),
        }
    }
}

/// The first record in every sector. Combines what the original sector
/// chain and directory chain headers each carried separately (see
/// `SPEC_FULL.md` §3): a back-link to the previous sector in the chain,
/// and the chain kind so a mismatched mount is caught immediately.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SectorHeaderBody {
    pub prev_sector: U32,
    pub kind: u8,
}

impl SectorHeaderBody {
    pub fn new(prev_sector: u32, kind: SectorKind) -> Self {
        Self {
            prev_sector: prev_sector.into(),
            kind: kind as u8,
        }
    }

    pub fn kind(&self) -> Result<SectorKind> {
        SectorKind::from_u8(self.kind)
    }
}

/// A directory entry naming a file. The name follows as trailing UTF-8
/// bytes, its length implied by the record's own length prefix.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FileEntryBody {
    pub id: U32,
}

/// A typed attribute attached to a file id. `size` is the length of the
/// trailing payload that follows this fixed header.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FileAttributeBody {
    pub id: U32,
    pub attr_type: u8,
    pub size: U16,
}

/// A file's data reference: either inline bytes, a pointer at a data
/// chain, or (when the trailing region is empty) a tombstone recording
/// that the file was truncated or unlinked.
///
/// Which of the three applies is not stored as a separate flag — it
/// follows from `size` together with however many trailing bytes the
/// record's own length prefix says follow this header, exactly as
/// `directory_chain.cpp`'s `file_data` reader relies on the delimited
/// buffer telling it how much is left rather than tagging it twice.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FileDataBody {
    pub id: U32,
    pub size: U32,
}

/// Fixed-width payload of a chained `FileData` record's trailing region.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ChainRef {
    pub head: U32,
    pub tail: U32,
}

/// The resolved meaning of a `FileData` record, given its trailing bytes.
pub enum FileDataKind<'a> {
    Tombstone,
    Inline(&'a [u8]),
    Chained { head: u32, tail: u32 },
}

pub fn classify_file_data(body: &FileDataBody, trailing: &[u8]) -> Result<FileDataKind<'_>> {
    let size = body.size.get();
    if size > 0 {
        if trailing.len() != size as usize {
            return Err(Error::Corruption(CorruptionKind::UnknownFileId));
        }
        return Ok(FileDataKind::Inline(trailing));
    }
    match trailing.len() {
        0 => Ok(FileDataKind::Tombstone),
        8 => {
            let chain_ref = ChainRef::ref_from_bytes(trailing)
                .map_err(|_| Error::Corruption(CorruptionKind::UnknownFileId))?;
            Ok(FileDataKind::Chained {
                head: chain_ref.head.get(),
                tail: chain_ref.tail.get(),
            })
        }
        _ => Err(Error::Corruption(CorruptionKind::UnknownFileId)),
    }
}

/// A pair identifying a data chain, or `INVALID_SECTOR`/`INVALID_SECTOR`
/// when there is none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadTail {
    pub head: u32,
    pub tail: u32,
}

impl HeadTail {
    pub const INVALID: HeadTail = HeadTail {
        head: INVALID_SECTOR,
        tail: INVALID_SECTOR,
    };

    /// Per spec §3 invariant 3: a data chain's head and tail are never
    /// sector `0` (that sector id is reserved for the root directory
    /// chain).
    pub fn valid(&self) -> bool {
        self.head != INVALID_SECTOR && self.tail != INVALID_SECTOR && self.head != 0 && self.tail != 0
    }
}
