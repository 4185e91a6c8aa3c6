use log::debug;

use super::Mmu;
use crate::{
    fault::{FailureCause, FaultOutcome, PageFault},
    sched::{Poll, Scheduler, Suspend},
    AccessKind, MmuError, PageId, ThreadId, WaitId,
};

#[derive(Debug, Clone)]
enum State {
    Lookup,
    Faulting(PageFault),
    Waiting(PageId),
}

/// One memory reference by a thread, from address decoding to setting the
/// frame's access bits.
///
/// Finishes with the referenced page. A thread killed while the reference
/// was suspended gets its page back untouched, whether resident or not.
#[derive(Debug, Clone)]
pub struct Reference {
    thread: ThreadId,
    address: u32,
    kind: AccessKind,
    state: State,
}

impl Reference {
    pub fn new(thread: ThreadId, address: u32, kind: AccessKind) -> Self {
        Reference {
            thread,
            address,
            kind,
            state: State::Lookup,
        }
    }

    pub fn poll(
        &mut self,
        mmu: &mut Mmu,
        sched: &mut dyn Scheduler,
    ) -> Poll<Result<PageId, MmuError>> {
        loop {
            match &mut self.state {
                State::Lookup => {
                    let space = match sched.space_of(self.thread) {
                        Some(space) => space,
                        None => return Poll::Ready(Err(MmuError::UnknownThread(self.thread))),
                    };
                    let page = match mmu.decode(space, self.address) {
                        Ok(page) => page,
                        Err(e) => return Poll::Ready(Err(e)),
                    };
                    let Some(entry) = mmu.entry(page) else {
                        return Poll::Ready(Err(MmuError::UnknownPage(page)));
                    };
                    if entry.is_valid() {
                        self.touch(mmu, page);
                        return Poll::Ready(Ok(page));
                    }
                    if entry.is_faulting() {
                        debug!("{} waits for {}", self.thread, page);
                        self.state = State::Waiting(page);
                        return Poll::Pending(Suspend::Wait(WaitId::Page(page)));
                    }
                    let fault = mmu.dispatch_fault(self.kind, page, self.thread);
                    self.state = State::Faulting(fault);
                }
                State::Faulting(fault) => {
                    let outcome = match fault.poll(mmu, sched) {
                        Poll::Ready(outcome) => outcome,
                        Poll::Pending(suspend) => return Poll::Pending(suspend),
                    };
                    let page = fault.page();
                    if sched.status(self.thread).is_killed() {
                        return Poll::Ready(Ok(page));
                    }
                    match outcome {
                        FaultOutcome::OutOfFrames => {
                            return Poll::Ready(Err(MmuError::OutOfFrames))
                        }
                        FaultOutcome::Failure(FailureCause::Io) => {
                            return Poll::Ready(Err(MmuError::IoFailed(page)))
                        }
                        FaultOutcome::Failure(FailureCause::ThreadTerminated)
                            if !mmu.has_space(page.space) =>
                        {
                            return Poll::Ready(Ok(page))
                        }
                        _ => self.state = State::Lookup,
                    }
                }
                State::Waiting(page) => {
                    let page = *page;
                    if sched.status(self.thread).is_killed() {
                        return Poll::Ready(Ok(page));
                    }
                    self.state = State::Lookup;
                }
            }
        }
    }

    fn touch(&self, mmu: &mut Mmu, page: PageId) {
        let frame = mmu.entry(page).and_then(|e| e.frame());
        if let Some(frame) = frame.and_then(|f| mmu.frame_mut(f)) {
            frame.set_referenced(true);
            if self.kind == AccessKind::Write {
                frame.set_dirty(true);
            }
        }
    }
}
