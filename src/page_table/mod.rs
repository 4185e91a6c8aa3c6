mod page_table_entry;

pub use page_table_entry::PageTableEntry;

use crate::{FrameId, PageId, SpaceId};

/// The non-inverted page table of one address space.
#[derive(Debug, Clone)]
pub struct PageTable {
    space: SpaceId,
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    pub fn init(space: SpaceId, pages: usize) -> Self {
        PageTable {
            space,
            entries: vec![PageTableEntry::default(); pages],
        }
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn page_id(&self, page_number: usize) -> PageId {
        PageId::new(self.space, page_number)
    }

    pub fn get_entry(&self, page_number: usize) -> Option<&PageTableEntry> {
        self.entries.get(page_number)
    }

    pub(crate) fn get_entry_mut(&mut self, page_number: usize) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(page_number)
    }

    pub fn get_frame(&self, page_number: usize) -> Option<FrameId> {
        self.get_entry(page_number)?.frame()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageId, &PageTableEntry)> {
        let space = self.space;
        self.entries
            .iter()
            .enumerate()
            .map(move |(number, entry)| (PageId::new(space, number), entry))
    }

    pub fn resident_pages(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }
}
