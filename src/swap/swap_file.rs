use std::collections::HashMap;

use disk::Disk;
use log::debug;

use super::{BackingStore, RegionMap, SwapError, SwapSlot};
use crate::SpaceId;

/// A backing store on a disk image. Each attached address space owns a
/// contiguous region of `pages_per_space` blocks.
#[derive(Debug)]
pub struct SwapFile {
    disk: Disk,
    pages_per_space: usize,
    regions: RegionMap,
    owners: HashMap<SpaceId, usize>,
}

impl SwapFile {
    pub fn create(
        name: &str,
        page_size: usize,
        pages_per_space: usize,
        max_spaces: usize,
    ) -> Result<Self, SwapError> {
        let disk = Disk::create(name, page_size, pages_per_space * max_spaces)?;
        Ok(Self::on_disk(disk, pages_per_space))
    }

    pub fn on_disk(disk: Disk, pages_per_space: usize) -> Self {
        let max_spaces = if pages_per_space == 0 {
            0
        } else {
            disk.blocks() / pages_per_space
        };
        SwapFile {
            disk,
            pages_per_space,
            regions: RegionMap::new(max_spaces),
            owners: HashMap::new(),
        }
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    fn block_of(&self, slot: SwapSlot) -> Result<usize, SwapError> {
        let region = self
            .owners
            .get(&slot.space)
            .ok_or(SwapError::UnknownSpace(slot.space))?;
        if slot.page >= self.pages_per_space {
            return Err(SwapError::SlotOutOfRange(slot));
        }
        Ok(region * self.pages_per_space + slot.page)
    }
}

impl BackingStore for SwapFile {
    fn attach(&mut self, space: SpaceId) -> Result<(), SwapError> {
        if self.owners.contains_key(&space) {
            return Ok(());
        }
        let region = self.regions.allocate().ok_or(SwapError::SwapFull)?;
        debug!("Swap region {} for {}", region, space);
        // A recycled region still holds the previous owner's pages.
        let zero = vec![0; self.disk.block_size()];
        for page in 0..self.pages_per_space {
            self.disk
                .write_block(region * self.pages_per_space + page, &zero)?;
        }
        self.owners.insert(space, region);
        Ok(())
    }

    fn detach(&mut self, space: SpaceId) {
        if let Some(region) = self.owners.remove(&space) {
            debug!("Swap region {} released by {}", region, space);
            self.regions.deallocate(region);
        }
    }

    fn read(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError> {
        let block = self.block_of(slot)?;
        self.disk.read_block(block, buf)?;
        Ok(())
    }

    fn write(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError> {
        let block = self.block_of(slot)?;
        self.disk.write_block(block, buf)?;
        Ok(())
    }
}
