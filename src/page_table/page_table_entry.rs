use crate::{FrameId, ThreadId};

/// Per-page metadata of one address space.
///
/// `frame` mirrors the frame's back reference while the page is valid. It
/// may also be set on an invalid page between the attach and the commit of
/// a fault, when `validating_thread` is always set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    valid: bool,
    frame: Option<FrameId>,
    validating_thread: Option<ThreadId>,
}

impl PageTableEntry {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    pub fn validating_thread(&self) -> Option<ThreadId> {
        self.validating_thread
    }

    pub fn is_faulting(&self) -> bool {
        self.validating_thread.is_some()
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub(crate) fn set_frame(&mut self, frame: Option<FrameId>) {
        self.frame = frame;
    }

    pub(crate) fn set_validating_thread(&mut self, thread: Option<ThreadId>) {
        self.validating_thread = thread;
    }

    /// Back to the never-touched state.
    pub(crate) fn unmap(&mut self) {
        self.valid = false;
        self.frame = None;
    }
}
