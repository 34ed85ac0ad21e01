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

//! In-memory `SectorMap`, `SectorAllocator` and `BufferPool` used by
//! `stratafs`'s own test suite and by anyone wanting to exercise the
//! filesystem without real flash.

use std::{
    cell::RefCell,
    ops::{Deref, DerefMut},
    rc::Rc,
};

use log::debug;
use stratafs_device::{BufferPool, SectorAllocator, SectorMap};
use stratafs_err::{Error, IoError, Result};

struct Inner {
    sector_size: usize,
    sectors: Vec<Option<Vec<u8>>>,
    next_sector: u32,
    free_buffers: Vec<Vec<u8>>,
}

impl Inner {
    fn ensure_len(&mut self, sector: u32) {
        let sector = sector as usize;
        if self.sectors.len() <= sector {
            self.sectors.resize(sector + 1, None);
        }
    }
}

/// A RAM-backed medium: sector 0 (the root directory head, by convention)
/// is pre-erased at construction, and `allocate()` hands out sectors
/// starting at 1, erased to `0xFF` on first use, same as a freshly erased
/// real flash sector.
#[derive(Clone)]
pub struct RamDevice {
    inner: Rc<RefCell<Inner>>,
}

impl RamDevice {
    pub fn new(sector_size: usize) -> Self {
        let mut inner = Inner {
            sector_size,
            sectors: Vec::new(),
            next_sector: 1,
            free_buffers: Vec::new(),
        };
        inner.ensure_len(0);
        inner.sectors[0] = Some(vec![0xFF; sector_size]);

        debug!("ram device created, sector_size={sector_size}");

        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// A cheap handle sharing this device's allocator state.
    pub fn allocator(&self) -> RamAllocator {
        RamAllocator {
            inner: self.inner.clone(),
        }
    }

    /// A cheap handle sharing this device's buffer free-list.
    pub fn buffer_pool(&self) -> RamBufferPool {
        RamBufferPool {
            inner: self.inner.clone(),
        }
    }

    /// Resets every allocated sector back to erased. Used between test
    /// scenarios that want a clean medium without re-creating the device.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        let sector_size = inner.sector_size;
        for sector in inner.sectors.iter_mut() {
            if sector.is_some() {
                *sector = Some(vec![0xFF; sector_size]);
            }
        }
        inner.next_sector = 1;
    }
}

impl SectorMap for RamDevice {
    fn sector_size(&self) -> usize {
        self.inner.borrow().sector_size
    }

    fn sector_count(&self) -> u32 {
        self.inner.borrow().sectors.len() as u32
    }

    fn read(&self, sector: u32, buffer: &mut [u8]) -> Result<()> {
        let inner = self.inner.borrow();
        let Some(Some(contents)) = inner.sectors.get(sector as usize) else {
            return Err(Error::Io(IoError::Read));
        };
        if buffer.len() != contents.len() {
            return Err(Error::Io(IoError::Read));
        }
        buffer.copy_from_slice(contents);
        Ok(())
    }

    fn write(&self, sector: u32, buffer: &[u8]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.sectors.get(sector as usize).map(Option::is_some) != Some(true) {
            return Err(Error::Io(IoError::Write));
        }
        if buffer.len() != inner.sector_size {
            return Err(Error::Io(IoError::Write));
        }
        inner.sectors[sector as usize] = Some(buffer.to_vec());
        Ok(())
    }
}

/// Hands out fresh, erased sector numbers. Shares state with the
/// `RamDevice` it was obtained from.
#[derive(Clone)]
pub struct RamAllocator {
    inner: Rc<RefCell<Inner>>,
}

impl SectorAllocator for RamAllocator {
    fn allocate(&mut self) -> Result<u32> {
        let mut inner = self.inner.borrow_mut();
        let sector = inner.next_sector;
        inner.next_sector += 1;
        inner.ensure_len(sector);
        let sector_size = inner.sector_size;
        inner.sectors[sector as usize] = Some(vec![0xFF; sector_size]);

        debug!("allocated sector {sector}");

        Ok(sector)
    }
}

/// A free-list of sector-sized scratch buffers. `acquire()` reuses a
/// previously released buffer when one is available instead of
/// allocating, the way a real embedded buffer pool would.
#[derive(Clone)]
pub struct RamBufferPool {
    inner: Rc<RefCell<Inner>>,
}

impl BufferPool for RamBufferPool {
    type Buffer = PoolBuffer;

    fn sector_size(&self) -> usize {
        self.inner.borrow().sector_size
    }

    fn acquire(&self) -> PoolBuffer {
        let mut inner = self.inner.borrow_mut();
        let sector_size = inner.sector_size;
        let mut buf = inner
            .free_buffers
            .pop()
            .unwrap_or_else(|| vec![0xFF; sector_size]);
        buf.iter_mut().for_each(|b| *b = 0xFF);
        PoolBuffer {
            inner: self.inner.clone(),
            buf: Some(buf),
        }
    }
}

/// A borrowed scratch buffer. Returned to its pool's free-list on drop
/// rather than deallocated, matching the "no aliasing, single loan"
/// discipline described in spec §5.
pub struct PoolBuffer {
    inner: Rc<RefCell<Inner>>,
    buf: Option<Vec<u8>>,
}

impl Deref for PoolBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer taken")
    }
}

impl DerefMut for PoolBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer taken")
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.inner.borrow_mut().free_buffers.push(buf);
        }
    }
}
