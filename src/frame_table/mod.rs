mod victim;

use crate::{FrameId, PageId, SpaceId};

pub use self::victim::VictimPolicy;

/// Descriptor of one physical frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    mapped_page: Option<PageId>,
    referenced: bool,
    dirty: bool,
    lock_count: u32,
    reserved_by: Option<SpaceId>,
}

impl Frame {
    pub fn mapped_page(&self) -> Option<PageId> {
        self.mapped_page
    }

    pub fn is_free(&self) -> bool {
        self.mapped_page.is_none()
    }

    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn is_pinned(&self) -> bool {
        self.lock_count > 0
    }

    pub fn reserved_by(&self) -> Option<SpaceId> {
        self.reserved_by
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved_by.is_some()
    }

    pub(crate) fn set_mapped_page(&mut self, page: Option<PageId>) {
        self.mapped_page = page;
    }

    pub(crate) fn set_referenced(&mut self, referenced: bool) {
        self.referenced = referenced;
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub(crate) fn pin(&mut self) {
        self.lock_count += 1;
    }

    /// Never goes below zero.
    pub(crate) fn unpin(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    pub(crate) fn reset_pins(&mut self) {
        self.lock_count = 0;
    }

    pub(crate) fn reserve(&mut self, space: SpaceId) {
        self.reserved_by = Some(space);
    }

    /// Drops the reservation only if `space` holds it.
    pub(crate) fn unreserve(&mut self, space: SpaceId) -> bool {
        if self.reserved_by == Some(space) {
            self.reserved_by = None;
            true
        } else {
            false
        }
    }

    /// Forget the occupant and its access history.
    pub(crate) fn release(&mut self) {
        self.mapped_page = None;
        self.dirty = false;
        self.referenced = false;
    }
}

/// The fixed table of physical frames shared by every address space.
#[derive(Debug, Clone)]
pub struct FrameTable {
    frames: Vec<Frame>,
}

impl FrameTable {
    pub fn init(frame_count: usize) -> Self {
        FrameTable {
            frames: vec![Frame::default(); frame_count],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: FrameId) -> Option<&Frame> {
        self.frames.get(frame.0)
    }

    pub(crate) fn get_mut(&mut self, frame: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(frame.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, frame)| (FrameId(i), frame))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (FrameId, &mut Frame)> {
        self.frames
            .iter_mut()
            .enumerate()
            .map(|(i, frame)| (FrameId(i), frame))
    }

    pub fn free_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_free()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_all_free() {
        let table = FrameTable::init(4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.free_frames(), 4);
        assert!(table.get(FrameId(4)).is_none());
    }

    #[test]
    fn unpin_floors_at_zero() {
        let mut frame = Frame::default();
        frame.unpin();
        assert_eq!(frame.lock_count(), 0);
        frame.pin();
        frame.pin();
        frame.unpin();
        assert_eq!(frame.lock_count(), 1);
        assert!(frame.is_pinned());
    }

    #[test]
    fn unreserve_requires_owner() {
        let mut frame = Frame::default();
        frame.reserve(SpaceId(1));
        assert!(!frame.unreserve(SpaceId(2)));
        assert_eq!(frame.reserved_by(), Some(SpaceId(1)));
        assert!(frame.unreserve(SpaceId(1)));
        assert!(!frame.is_reserved());
    }

    #[test]
    fn release_clears_history() {
        let mut table = FrameTable::init(2);
        let page = PageId::new(SpaceId(0), 7);
        let frame = table.get_mut(FrameId(1)).unwrap();
        frame.set_mapped_page(Some(page));
        frame.set_dirty(true);
        frame.set_referenced(true);

        table.get_mut(FrameId(1)).unwrap().release();
        let frame = table.get(FrameId(1)).unwrap();
        assert!(frame.is_free());
        assert!(!frame.is_dirty());
        assert!(!frame.is_referenced());
        assert_eq!(frame.mapped_page(), None);
    }
}
