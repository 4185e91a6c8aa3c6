mod invariants;
mod translate;

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use memory::PhysicalMemory;

use crate::{
    config::MmuConfig,
    fault::PageFault,
    frame_table::{Frame, FrameTable, VictimPolicy},
    page_lock::PageLock,
    page_table::{PageTable, PageTableEntry},
    sched::{IoKind, IoRequest},
    swap::{BackingStore, SwapError, SwapSlot},
    AccessKind, FaultId, FrameId, IoId, MmuError, PageId, SpaceId, ThreadId,
};

pub use self::invariants::InvariantViolation;
pub use self::translate::Reference;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MmuStats {
    pub faults: u64,
    pub evictions: u64,
    pub write_backs: u64,
    pub swap_ins: u64,
    pub out_of_frames: u64,
    pub unwinds: u64,
}

/// The paging core: the frame table, the page table of every address
/// space and the contents of physical memory.
#[derive(Debug)]
pub struct Mmu {
    config: MmuConfig,
    frames: FrameTable,
    spaces: BTreeMap<SpaceId, PageTable>,
    memory: PhysicalMemory,
    io_results: HashMap<IoId, Result<(), SwapError>>,
    next_fault: u64,
    next_io: u64,
    stats: MmuStats,
}

impl Mmu {
    pub fn new(config: MmuConfig) -> Result<Self, MmuError> {
        config.validate()?;
        info!(
            "MMU with {} frames of {} bytes, {} pages per space",
            config.frame_count,
            config.page_size(),
            config.pages_per_space()
        );
        Ok(Mmu {
            frames: FrameTable::init(config.frame_count),
            memory: PhysicalMemory::new(config.page_size(), config.frame_count),
            spaces: BTreeMap::new(),
            io_results: HashMap::new(),
            next_fault: 0,
            next_io: 0,
            stats: MmuStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &MmuConfig {
        &self.config
    }

    pub fn stats(&self) -> MmuStats {
        self.stats
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn frame(&self, frame: FrameId) -> Option<&Frame> {
        self.frames.get(frame)
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn victim_policy(&self) -> VictimPolicy {
        VictimPolicy {
            last_resort: self.config.last_resort_victim,
        }
    }

    pub fn spaces(&self) -> impl Iterator<Item = SpaceId> + '_ {
        self.spaces.keys().copied()
    }

    pub fn has_space(&self, space: SpaceId) -> bool {
        self.spaces.contains_key(&space)
    }

    pub fn page_table(&self, space: SpaceId) -> Option<&PageTable> {
        self.spaces.get(&space)
    }

    pub fn entry(&self, page: PageId) -> Option<&PageTableEntry> {
        self.spaces.get(&page.space)?.get_entry(page.number)
    }

    pub(crate) fn entry_mut(&mut self, page: PageId) -> Option<&mut PageTableEntry> {
        self.spaces.get_mut(&page.space)?.get_entry_mut(page.number)
    }

    pub(crate) fn frame_mut(&mut self, frame: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(frame)
    }

    pub(crate) fn stats_mut(&mut self) -> &mut MmuStats {
        &mut self.stats
    }

    /// Create the page table of a new address space. Every entry starts
    /// unmapped.
    pub fn create_page_table(&mut self, space: SpaceId) -> Result<(), MmuError> {
        if self.spaces.contains_key(&space) {
            return Ok(());
        }
        debug!("Page table for {}", space);
        self.spaces.insert(
            space,
            PageTable::init(space, self.config.pages_per_space()),
        );
        Ok(())
    }

    /// Tear down an address space: release every frame it occupies and drop
    /// every reservation it holds.
    pub fn deallocate_memory(&mut self, space: SpaceId) -> Result<(), MmuError> {
        let table = self
            .spaces
            .remove(&space)
            .ok_or(MmuError::UnknownSpace(space))?;
        let mut released = 0;
        for (page, entry) in table.iter() {
            let Some(frame_id) = entry.frame() else {
                continue;
            };
            if let Some(frame) = self.frames.get_mut(frame_id) {
                if frame.mapped_page() == Some(page) {
                    frame.release();
                    frame.reset_pins();
                    released += 1;
                }
            }
        }
        for (_, frame) in self.frames.iter_mut() {
            // Frames may still point at this space without the page pointing
            // back, e.g. after an unwind raced with the teardown.
            if frame.mapped_page().map(|p| p.space) == Some(space) {
                frame.release();
                frame.reset_pins();
                released += 1;
            }
            frame.unreserve(space);
        }
        info!("Deallocated {}: {} frames released", space, released);
        Ok(())
    }

    /// The page that `address` falls in, within `space`.
    pub fn decode(&self, space: SpaceId, address: u32) -> Result<PageId, MmuError> {
        let table = self
            .spaces
            .get(&space)
            .ok_or(MmuError::UnknownSpace(space))?;
        if !self.config.contains(address) {
            return Err(MmuError::InvalidAddress(address));
        }
        let number = self.config.page_number(address);
        if number >= table.len() {
            return Err(MmuError::InvalidAddress(address));
        }
        Ok(table.page_id(number))
    }

    /// Physical address of `address` if its page is resident.
    pub fn physical_address(&self, space: SpaceId, address: u32) -> Option<usize> {
        let page = self.decode(space, address).ok()?;
        let entry = self.entry(page)?;
        if !entry.is_valid() {
            return None;
        }
        let frame = entry.frame()?;
        Some(frame.0 * self.config.page_size() + self.config.page_offset(address))
    }

    pub fn read_physical(&self, address: usize) -> Result<u8, MmuError> {
        Ok(self.memory.read_u8(address)?)
    }

    pub fn write_physical(&mut self, address: usize, byte: u8) -> Result<(), MmuError> {
        Ok(self.memory.write_u8(address, byte)?)
    }

    /// Start a memory reference. Poll the returned machine to drive it.
    pub fn access(&self, thread: ThreadId, address: u32, kind: AccessKind) -> Reference {
        Reference::new(thread, address, kind)
    }

    /// Start pinning `page` on behalf of `thread`.
    pub fn lock(&self, thread: ThreadId, page: PageId) -> PageLock {
        PageLock::new(thread, page)
    }

    /// Drop one pin of the frame backing `page`. Unpinning an unpinned or
    /// non-resident page does nothing.
    pub fn unlock(&mut self, page: PageId) -> Result<(), MmuError> {
        let entry = self.entry(page).ok_or(MmuError::UnknownPage(page))?;
        if !entry.is_valid() {
            return Ok(());
        }
        if let Some(frame) = entry.frame().and_then(|f| self.frames.get_mut(f)) {
            frame.unpin();
        }
        Ok(())
    }

    /// Raise a page fault for `page`. The fault runs when polled.
    pub(crate) fn dispatch_fault(
        &mut self,
        kind: AccessKind,
        page: PageId,
        thread: ThreadId,
    ) -> PageFault {
        let id = FaultId(self.next_fault);
        self.next_fault += 1;
        self.stats.faults += 1;
        debug!("Fault #{} on {} by {} ({:?})", id.0, page, thread, kind);
        PageFault::new(id, thread, kind, page)
    }

    pub(crate) fn next_io_id(&mut self) -> IoId {
        let id = IoId(self.next_io);
        self.next_io += 1;
        id
    }

    /// Carry out a transfer the device has finished and remember how it went
    /// for the thread waiting on it.
    pub fn complete_io(&mut self, request: &IoRequest, store: &mut dyn BackingStore) {
        let result = self.transfer(request, store);
        match &result {
            Ok(()) => {
                info!(
                    "{:?} of {} via {} done",
                    request.kind, request.slot.page, request.frame
                );
                match request.kind {
                    IoKind::SwapIn => self.stats.swap_ins += 1,
                    IoKind::WriteBack => self.stats.write_backs += 1,
                }
            }
            Err(e) => warn!("{:?} via {} failed: {}", request.kind, request.frame, e),
        }
        self.io_results.insert(request.id, result);
    }

    fn transfer(
        &mut self,
        request: &IoRequest,
        store: &mut dyn BackingStore,
    ) -> Result<(), SwapError> {
        let slot = request.slot;
        match request.kind {
            IoKind::SwapIn => {
                let buf = self
                    .memory
                    .frame_mut(request.frame.0)
                    .map_err(|_| SwapError::Failed(slot))?;
                store.read(slot, buf)
            }
            IoKind::WriteBack => {
                let buf = self
                    .memory
                    .frame(request.frame.0)
                    .map_err(|_| SwapError::Failed(slot))?;
                store.write(slot, buf)
            }
        }
    }

    pub(crate) fn take_io_result(&mut self, io: IoId) -> Option<Result<(), SwapError>> {
        self.io_results.remove(&io)
    }

    pub(crate) fn slot_of(page: PageId) -> SwapSlot {
        SwapSlot {
            space: page.space,
            page: page.number,
        }
    }

    /// Take the frame away from `victim`. The frame keeps its contents.
    pub(crate) fn evict(&mut self, frame_id: FrameId, victim: PageId) {
        let Some(frame) = self.frames.get_mut(frame_id) else {
            return;
        };
        frame.set_referenced(false);
        if frame.mapped_page() != Some(victim) {
            return;
        }
        frame.set_mapped_page(None);
        if let Some(entry) = self.entry_mut(victim) {
            entry.unmap();
        }
        self.stats.evictions += 1;
        debug!("Evicted {} from {}", victim, frame_id);
    }
}
