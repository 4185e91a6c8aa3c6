use std::fmt;

use super::Mmu;
use crate::{FrameId, PageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The frame points at a page that does not point back, or is invalid.
    FrameNotMirrored { frame: FrameId, page: PageId },
    /// A valid page whose frame does not point back at it.
    PageNotMirrored { page: PageId, frame: Option<FrameId> },
    /// An invalid page holds a frame without a fault in flight.
    StrayAttachment { page: PageId, frame: FrameId },
    ValidWhileFaulting { page: PageId },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::FrameNotMirrored { frame, page } => {
                write!(f, "{} maps {} but not the other way round", frame, page)
            }
            InvariantViolation::PageNotMirrored { page, frame } => {
                write!(f, "{} is valid but {:?} does not map it", page, frame)
            }
            InvariantViolation::StrayAttachment { page, frame } => {
                write!(f, "{} holds {} outside of a fault", page, frame)
            }
            InvariantViolation::ValidWhileFaulting { page } => {
                write!(f, "{} is valid with a fault in flight", page)
            }
        }
    }
}

impl Mmu {
    /// Check that every frame and page agree on their binding.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (frame_id, frame) in self.frames().iter() {
            let Some(page) = frame.mapped_page() else {
                continue;
            };
            match self.entry(page) {
                Some(entry) if entry.is_valid() && entry.frame() == Some(frame_id) => {}
                _ => {
                    return Err(InvariantViolation::FrameNotMirrored {
                        frame: frame_id,
                        page,
                    })
                }
            }
        }
        for space in self.spaces() {
            let Some(table) = self.page_table(space) else {
                continue;
            };
            for (page, entry) in table.iter() {
                if entry.is_valid() {
                    if entry.is_faulting() {
                        return Err(InvariantViolation::ValidWhileFaulting { page });
                    }
                    let mirrored = entry
                        .frame()
                        .and_then(|f| self.frame(f))
                        .map(|f| f.mapped_page() == Some(page))
                        .unwrap_or(false);
                    if !mirrored {
                        return Err(InvariantViolation::PageNotMirrored {
                            page,
                            frame: entry.frame(),
                        });
                    }
                } else if let Some(frame) = entry.frame() {
                    if !entry.is_faulting() {
                        return Err(InvariantViolation::StrayAttachment { page, frame });
                    }
                }
            }
        }
        Ok(())
    }
}
