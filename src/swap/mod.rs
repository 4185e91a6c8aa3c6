mod regions;
mod swap_file;

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use disk::DiskError;

use crate::SpaceId;

pub use self::regions::RegionMap;
pub use self::swap_file::SwapFile;

/// Where a page lives while it is not resident: one slot per page number
/// of each address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot {
    pub space: SpaceId,
    pub page: usize,
}

#[derive(Debug, PartialEq)]
pub enum SwapError {
    UnknownSpace(SpaceId),
    SlotOutOfRange(SwapSlot),
    /// Every swap region is taken.
    SwapFull,
    IncorrectPageSize,
    Failed(SwapSlot),
    Disk(DiskError),
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapError::UnknownSpace(s) => write!(f, "no swap area for {}", s),
            SwapError::SlotOutOfRange(slot) => {
                write!(f, "slot {} of {} out of range", slot.page, slot.space)
            }
            SwapError::SwapFull => write!(f, "swap file full"),
            SwapError::IncorrectPageSize => write!(f, "buffer is not one page"),
            SwapError::Failed(slot) => write!(f, "transfer of {}:{} failed", slot.space, slot.page),
            SwapError::Disk(e) => write!(f, "{}", e),
        }
    }
}

impl From<DiskError> for SwapError {
    fn from(e: DiskError) -> Self {
        SwapError::Disk(e)
    }
}

/// Persistent home of non-resident pages.
pub trait BackingStore {
    /// Reserve the swap area of a new address space.
    fn attach(&mut self, space: SpaceId) -> Result<(), SwapError>;

    /// Give the swap area of a torn-down address space back.
    fn detach(&mut self, space: SpaceId);

    fn read(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError>;

    fn write(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError>;
}

/// A backing store held in memory. Slots that were never written read as
/// zeroes.
#[derive(Debug, Default, Clone)]
pub struct MemorySwap {
    spaces: HashSet<SpaceId>,
    slots: HashMap<SwapSlot, Vec<u8>>,
    failing: HashSet<SwapSlot>,
}

impl MemorySwap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later transfer on `slot` fail.
    pub fn fail_slot(&mut self, slot: SwapSlot) {
        self.failing.insert(slot);
    }

    pub fn contents(&self, slot: SwapSlot) -> Option<&[u8]> {
        self.slots.get(&slot).map(|v| v.as_slice())
    }

    fn check(&self, slot: SwapSlot) -> Result<(), SwapError> {
        if !self.spaces.contains(&slot.space) {
            return Err(SwapError::UnknownSpace(slot.space));
        }
        if self.failing.contains(&slot) {
            return Err(SwapError::Failed(slot));
        }
        Ok(())
    }
}

impl BackingStore for MemorySwap {
    fn attach(&mut self, space: SpaceId) -> Result<(), SwapError> {
        self.spaces.insert(space);
        Ok(())
    }

    fn detach(&mut self, space: SpaceId) {
        self.spaces.remove(&space);
        self.slots.retain(|slot, _| slot.space != space);
    }

    fn read(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError> {
        self.check(slot)?;
        match self.slots.get(&slot) {
            Some(data) if data.len() == buf.len() => buf.copy_from_slice(data),
            Some(_) => return Err(SwapError::IncorrectPageSize),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError> {
        self.check(slot)?;
        self.slots.insert(slot, buf.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_slot_reads_zero() {
        let mut swap = MemorySwap::new();
        swap.attach(SpaceId(0)).unwrap();
        let mut buf = [0xff; 8];
        swap.read(SwapSlot { space: SpaceId(0), page: 3 }, &mut buf)
            .unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn write_then_read() {
        let mut swap = MemorySwap::new();
        swap.attach(SpaceId(1)).unwrap();
        let slot = SwapSlot { space: SpaceId(1), page: 0 };
        swap.write(slot, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0; 4];
        swap.read(slot, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn detached_space_is_gone() {
        let mut swap = MemorySwap::new();
        swap.attach(SpaceId(1)).unwrap();
        let slot = SwapSlot { space: SpaceId(1), page: 0 };
        swap.write(slot, &[1; 4]).unwrap();
        swap.detach(SpaceId(1));
        assert!(swap.contents(slot).is_none());
        assert_eq!(
            swap.read(slot, &mut [0; 4]),
            Err(SwapError::UnknownSpace(SpaceId(1)))
        );
    }

    #[test]
    fn injected_failure() {
        let mut swap = MemorySwap::new();
        swap.attach(SpaceId(0)).unwrap();
        let slot = SwapSlot { space: SpaceId(0), page: 2 };
        swap.fail_slot(slot);
        assert_eq!(swap.write(slot, &[0; 4]), Err(SwapError::Failed(slot)));
    }
}
