//! Page fault resolution.
//!
//! A fault walks through these states, suspending its thread where marked:
//!
//! ```text
//! Check ──(no victim)──────────────────────────────▶ out of frames
//!   │ reserve frame, mark validating thread
//!   ├─(dirty victim)─▶ WritingBack ⏸ ──(killed)────▶ failure
//!   │                      │ detach victim
//!   ▼                      ▼
//! attach, start swap-in ─▶ SwappingIn ⏸ ─(killed)──▶ failure
//!                          │ commit
//!                          ▼
//!                       Yielded ⏸ ─────────────────▶ success
//! ```
//!
//! A victim pinned or written while its write-back was in flight is given
//! up and the fault starts over from `Check`.
//!
//! Waking up never implies the I/O finished or the thread is still alive;
//! both are re-checked on every resumption.

#[cfg(test)]
mod tests;

use log::{debug, warn};

use crate::{
    mmu::Mmu,
    sched::{IoKind, IoRequest, Poll, Scheduler, Suspend},
    AccessKind, FaultId, FrameId, IoId, PageId, SpaceId, ThreadId, WaitId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The page was already resident. Nothing was done.
    AlreadyValid,
    ThreadTerminated,
    /// The backing store could not complete a transfer.
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    Success,
    Failure(FailureCause),
    OutOfFrames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Check,
    WritingBack {
        frame: FrameId,
        victim: PageId,
        io: IoId,
    },
    SwappingIn {
        frame: FrameId,
        io: IoId,
    },
    Yielded(FaultOutcome),
    Finished(FaultOutcome),
}

/// One in-flight page fault. Created by the translator or the lock manager
/// and polled until it is ready.
#[derive(Debug, Clone)]
pub struct PageFault {
    id: FaultId,
    thread: ThreadId,
    kind: AccessKind,
    page: PageId,
    state: State,
}

impl PageFault {
    pub(crate) fn new(id: FaultId, thread: ThreadId, kind: AccessKind, page: PageId) -> Self {
        PageFault {
            id,
            thread,
            kind,
            page,
            state: State::Check,
        }
    }

    pub fn id(&self) -> FaultId {
        self.id
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn kind(&self) -> AccessKind {
        self.kind
    }

    fn space(&self) -> SpaceId {
        self.page.space
    }

    fn event(&self) -> WaitId {
        WaitId::Fault(self.id)
    }

    fn park(&self) -> Poll<FaultOutcome> {
        Poll::Pending(Suspend::Wait(self.event()))
    }

    fn terminated(&self, mmu: &Mmu, sched: &dyn Scheduler) -> bool {
        sched.status(self.thread).is_killed() || !mmu.has_space(self.space())
    }

    fn finish(&mut self, outcome: FaultOutcome) -> Poll<FaultOutcome> {
        self.state = State::Finished(outcome);
        Poll::Ready(outcome)
    }

    pub fn poll(&mut self, mmu: &mut Mmu, sched: &mut dyn Scheduler) -> Poll<FaultOutcome> {
        match self.state {
            State::Check => self.check(mmu, sched),
            State::WritingBack { frame, victim, io } => {
                self.after_write_back(mmu, sched, frame, victim, io)
            }
            State::SwappingIn { frame, io } => self.after_swap_in(mmu, sched, frame, io),
            State::Yielded(outcome) => self.finish(outcome),
            State::Finished(outcome) => Poll::Ready(outcome),
        }
    }

    fn check(&mut self, mmu: &mut Mmu, sched: &mut dyn Scheduler) -> Poll<FaultOutcome> {
        let Some(entry) = mmu.entry(self.page) else {
            return self.finish(FaultOutcome::Failure(FailureCause::ThreadTerminated));
        };
        if entry.is_valid() {
            debug!("Fault #{}: {} already valid", self.id.0, self.page);
            sched.notify_all(WaitId::Page(self.page));
            self.state = State::Yielded(FaultOutcome::Failure(FailureCause::AlreadyValid));
            return Poll::Pending(Suspend::Yield);
        }

        let policy = mmu.victim_policy();
        let Some(frame_id) = mmu.frames().select_victim(policy) else {
            mmu.stats_mut().out_of_frames += 1;
            return self.finish(FaultOutcome::OutOfFrames);
        };

        if let Some(entry) = mmu.entry_mut(self.page) {
            entry.set_validating_thread(Some(self.thread));
        }
        let Some(frame) = mmu.frame_mut(frame_id) else {
            return self.finish(FaultOutcome::OutOfFrames);
        };
        frame.reserve(self.space());
        let occupant = frame.mapped_page().filter(|p| *p != self.page);
        let dirty = frame.is_dirty();

        match occupant {
            Some(victim) if dirty => {
                debug!(
                    "Fault #{}: writing back {} from {}",
                    self.id.0, victim, frame_id
                );
                // Writes that land during the write-back set it again.
                frame.set_dirty(false);
                let io = self.start_io(mmu, sched, IoKind::WriteBack, frame_id, victim);
                self.state = State::WritingBack {
                    frame: frame_id,
                    victim,
                    io,
                };
                self.park()
            }
            Some(victim) => {
                mmu.evict(frame_id, victim);
                self.swap_in(mmu, sched, frame_id)
            }
            None => self.swap_in(mmu, sched, frame_id),
        }
    }

    fn start_io(
        &self,
        mmu: &mut Mmu,
        sched: &mut dyn Scheduler,
        kind: IoKind,
        frame: FrameId,
        page: PageId,
    ) -> IoId {
        let id = mmu.next_io_id();
        sched.start_io(IoRequest {
            id,
            kind,
            thread: self.thread,
            frame,
            slot: Mmu::slot_of(page),
            wait: self.event(),
        });
        id
    }

    fn after_write_back(
        &mut self,
        mmu: &mut Mmu,
        sched: &mut dyn Scheduler,
        frame: FrameId,
        victim: PageId,
        io: IoId,
    ) -> Poll<FaultOutcome> {
        let Some(result) = mmu.take_io_result(io) else {
            return self.park();
        };
        // A victim whose space was torn down meanwhile needs no write-back.
        let cause = if self.terminated(mmu, sched) {
            Some(FailureCause::ThreadTerminated)
        } else if result.is_err() && mmu.has_space(victim.space) {
            Some(FailureCause::Io)
        } else {
            None
        };
        if let Some(cause) = cause {
            warn!(
                "Fault #{}: {:?} during write-back of {}",
                self.id.0, cause, victim
            );
            if let Some(f) = mmu.frame_mut(frame) {
                if f.mapped_page() == Some(victim) {
                    f.set_dirty(true);
                }
            }
            self.unwind(mmu, sched, frame);
            return self.finish(FaultOutcome::Failure(cause));
        }

        // The victim stayed valid during the write-back. If it was pinned or
        // written since, the frame is no longer a fair victim: start over.
        let touched = mmu
            .frame(frame)
            .map(|f| f.is_pinned() || f.is_dirty())
            .unwrap_or(false);
        if touched {
            debug!(
                "Fault #{}: {} used during write-back, choosing again",
                self.id.0, frame
            );
            self.release(mmu, sched, frame);
            return self.check(mmu, sched);
        }

        mmu.evict(frame, victim);
        self.swap_in(mmu, sched, frame)
    }

    fn swap_in(
        &mut self,
        mmu: &mut Mmu,
        sched: &mut dyn Scheduler,
        frame: FrameId,
    ) -> Poll<FaultOutcome> {
        // Only the forward link for now. The frame learns about the page
        // once the contents are in.
        if let Some(entry) = mmu.entry_mut(self.page) {
            entry.set_frame(Some(frame));
        }
        debug!("Fault #{}: swapping {} into {}", self.id.0, self.page, frame);
        let io = self.start_io(mmu, sched, IoKind::SwapIn, frame, self.page);
        self.state = State::SwappingIn { frame, io };
        self.park()
    }

    fn after_swap_in(
        &mut self,
        mmu: &mut Mmu,
        sched: &mut dyn Scheduler,
        frame: FrameId,
        io: IoId,
    ) -> Poll<FaultOutcome> {
        let Some(result) = mmu.take_io_result(io) else {
            return self.park();
        };
        let cause = if self.terminated(mmu, sched) {
            Some(FailureCause::ThreadTerminated)
        } else if result.is_err() {
            Some(FailureCause::Io)
        } else {
            None
        };
        if let Some(cause) = cause {
            warn!(
                "Fault #{}: {:?} during swap-in of {}",
                self.id.0, cause, self.page
            );
            let occupant = mmu
                .frame(frame)
                .and_then(|f| f.mapped_page())
                .filter(|p| p.space == self.space());
            if let Some(occupant) = occupant {
                mmu.evict(frame, occupant);
            }
            if let Some(entry) = mmu.entry_mut(self.page) {
                entry.set_frame(None);
            }
            self.unwind(mmu, sched, frame);
            return self.finish(FaultOutcome::Failure(cause));
        }

        let space = self.space();
        if let Some(f) = mmu.frame_mut(frame) {
            f.set_mapped_page(Some(self.page));
            f.unreserve(space);
        }
        if let Some(entry) = mmu.entry_mut(self.page) {
            entry.set_frame(Some(frame));
            entry.set_valid(true);
            entry.set_validating_thread(None);
        }
        debug!("Fault #{}: {} resident in {}", self.id.0, self.page, frame);
        sched.notify_all(WaitId::Page(self.page));
        sched.notify_all(self.event());
        self.state = State::Yielded(FaultOutcome::Success);
        Poll::Pending(Suspend::Yield)
    }

    /// Undo the reservation and the validating mark, and wake everybody
    /// who waits on this fault.
    fn unwind(&self, mmu: &mut Mmu, sched: &mut dyn Scheduler, frame: FrameId) {
        mmu.stats_mut().unwinds += 1;
        self.release(mmu, sched, frame);
    }

    fn release(&self, mmu: &mut Mmu, sched: &mut dyn Scheduler, frame: FrameId) {
        sched.notify_all(WaitId::Page(self.page));
        sched.notify_all(self.event());
        if let Some(entry) = mmu.entry_mut(self.page) {
            if entry.validating_thread() == Some(self.thread) {
                entry.set_validating_thread(None);
            }
        }
        if let Some(f) = mmu.frame_mut(frame) {
            f.unreserve(self.page.space);
        }
    }
}
