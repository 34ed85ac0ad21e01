//! The external collaborators `stratafs` is written against: a remapped
//! flash sector map, a sector allocator, and a scratch page buffer pool.
//!
//! None of these are implemented here — `stratafs_ram` provides an
//! in-memory reference implementation for tests and examples; a real
//! device driver provides these on target hardware.

use std::ops::{Deref, DerefMut};

use stratafs_err::Result;

/// Sector id reserved to mean "no sector". The root directory chain's head
/// is sector `0` by convention (spec §6).
pub const INVALID_SECTOR: u32 = u32::MAX;

/// A page-remapping flash translation layer. Implementations are assumed
/// to erase-before-write internally and to guarantee that a freshly
/// erased sector reads back as entirely `0xFF`.
pub trait SectorMap {
    /// Size in bytes of a sector, constant for the lifetime of the map.
    fn sector_size(&self) -> usize;

    /// Number of sectors addressable on this medium. Used to bound the
    /// forward-discovery scan a chain performs when it is mounted from
    /// only a head sector and no externally remembered tail (the root
    /// directory chain's situation at cold mount).
    fn sector_count(&self) -> u32;

    fn read(&self, sector: u32, buffer: &mut [u8]) -> Result<()>;

    fn write(&self, sector: u32, buffer: &[u8]) -> Result<()>;
}

/// Supplies fresh sector numbers. The only mutating collaborator in the
/// core's resource model (spec §5).
pub trait SectorAllocator {
    fn allocate(&mut self) -> Result<u32>;
}

/// A borrowed scratch buffer, sized to one sector, returned to the pool
/// when dropped. `stratafs` never sizes or heap-allocates its own page
/// buffers — it only ever holds one of these at a time per loaded chain.
pub trait BufferPool {
    type Buffer: Deref<Target = [u8]> + DerefMut;

    fn sector_size(&self) -> usize;

    fn acquire(&self) -> Self::Buffer;
}
