use log::debug;

use super::{Frame, FrameTable};
use crate::FrameId;

/// How a victim frame is chosen for a new fault.
///
/// Frames are scanned in index order on every call and the first match of
/// the highest tier wins:
///
/// 1. a free frame that is neither reserved nor pinned,
/// 2. a clean frame that is neither reserved nor pinned,
/// 3. any frame that is neither reserved nor pinned.
///
/// Frames fill in index order, which makes the scan behave roughly like
/// FIFO. When every tier comes up empty there is no victim, unless
/// `last_resort` is set, in which case the highest-index frame is returned
/// regardless of pins and reservations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VictimPolicy {
    pub last_resort: bool,
}

fn evictable(frame: &Frame) -> bool {
    !frame.is_reserved() && !frame.is_pinned()
}

impl FrameTable {
    fn scan(&self, tier: usize, accept: impl Fn(&Frame) -> bool) -> Option<FrameId> {
        let found = self
            .iter()
            .find(|(_, frame)| accept(frame))
            .map(|(id, _)| id);
        if let Some(frame) = found {
            debug!("Victim {} from tier {}", frame, tier);
        }
        found
    }

    pub fn select_victim(&self, policy: VictimPolicy) -> Option<FrameId> {
        self.scan(1, |f| f.is_free() && evictable(f))
            .or_else(|| self.scan(2, |f| !f.is_dirty() && evictable(f)))
            .or_else(|| self.scan(3, evictable))
            .or_else(|| {
                if policy.last_resort && !self.is_empty() {
                    let last = FrameId(self.len() - 1);
                    debug!("Victim {} by last resort", last);
                    Some(last)
                } else {
                    debug!("No victim frame");
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageId, SpaceId};

    fn occupied(table: &mut FrameTable, frame: usize, page: usize) {
        table
            .get_mut(FrameId(frame))
            .unwrap()
            .set_mapped_page(Some(PageId::new(SpaceId(0), page)));
    }

    #[test]
    fn free_frame_first() {
        let mut table = FrameTable::init(4);
        occupied(&mut table, 0, 0);
        occupied(&mut table, 1, 1);
        assert_eq!(
            table.select_victim(VictimPolicy::default()),
            Some(FrameId(2))
        );
    }

    #[test]
    fn free_but_reserved_is_skipped() {
        let mut table = FrameTable::init(2);
        table.get_mut(FrameId(0)).unwrap().reserve(SpaceId(3));
        assert_eq!(
            table.select_victim(VictimPolicy::default()),
            Some(FrameId(1))
        );
    }

    #[test]
    fn clean_before_dirty() {
        let mut table = FrameTable::init(3);
        for i in 0..3 {
            occupied(&mut table, i, i);
        }
        table.get_mut(FrameId(0)).unwrap().set_dirty(true);
        table.get_mut(FrameId(1)).unwrap().set_dirty(true);
        assert_eq!(
            table.select_victim(VictimPolicy::default()),
            Some(FrameId(2))
        );
    }

    #[test]
    fn dirty_when_nothing_clean() {
        let mut table = FrameTable::init(3);
        for i in 0..3 {
            occupied(&mut table, i, i);
            table.get_mut(FrameId(i)).unwrap().set_dirty(true);
        }
        table.get_mut(FrameId(0)).unwrap().pin();
        assert_eq!(
            table.select_victim(VictimPolicy::default()),
            Some(FrameId(1))
        );
    }

    #[test]
    fn pinned_and_reserved_exhaust_tiers() {
        let mut table = FrameTable::init(3);
        table.get_mut(FrameId(0)).unwrap().pin();
        table.get_mut(FrameId(1)).unwrap().reserve(SpaceId(1));
        table.get_mut(FrameId(2)).unwrap().pin();
        assert_eq!(table.select_victim(VictimPolicy::default()), None);
        assert_eq!(
            table.select_victim(VictimPolicy { last_resort: true }),
            Some(FrameId(2))
        );
    }
}
