use log::debug;

use crate::{
    fault::{FailureCause, FaultOutcome, PageFault},
    mmu::Mmu,
    sched::{Poll, Scheduler, Suspend},
    AccessKind, MmuError, PageId, ThreadId, WaitId,
};

#[derive(Debug, Clone)]
enum State {
    Check,
    Faulting(PageFault),
    Waiting,
}

/// Pins the frame of a page for the duration of an I/O, faulting the page
/// in first when it is not resident.
#[derive(Debug, Clone)]
pub struct PageLock {
    thread: ThreadId,
    page: PageId,
    state: State,
}

impl PageLock {
    pub fn new(thread: ThreadId, page: PageId) -> Self {
        PageLock {
            thread,
            page,
            state: State::Check,
        }
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn poll(
        &mut self,
        mmu: &mut Mmu,
        sched: &mut dyn Scheduler,
    ) -> Poll<Result<(), MmuError>> {
        loop {
            match &mut self.state {
                State::Check => {
                    let Some(entry) = mmu.entry(self.page) else {
                        return Poll::Ready(Err(MmuError::UnknownPage(self.page)));
                    };
                    if entry.is_valid() {
                        let frame = entry.frame();
                        if let Some(frame) = frame.and_then(|f| mmu.frame_mut(f)) {
                            frame.pin();
                            debug!(
                                "{} pinned {} ({} pins)",
                                self.thread,
                                self.page,
                                frame.lock_count()
                            );
                        }
                        return Poll::Ready(Ok(()));
                    }
                    match entry.validating_thread() {
                        None => {
                            let fault =
                                mmu.dispatch_fault(AccessKind::Lock, self.page, self.thread);
                            self.state = State::Faulting(fault);
                        }
                        Some(validator) if validator != self.thread => {
                            self.state = State::Waiting;
                            return Poll::Pending(Suspend::Wait(WaitId::Page(self.page)));
                        }
                        // Our own fault is in flight; nothing to pin yet.
                        Some(_) => return Poll::Ready(Err(MmuError::ThreadTerminated)),
                    }
                }
                State::Faulting(fault) => {
                    let outcome = match fault.poll(mmu, sched) {
                        Poll::Ready(outcome) => outcome,
                        Poll::Pending(suspend) => return Poll::Pending(suspend),
                    };
                    if sched.status(self.thread).is_killed() {
                        return Poll::Ready(Err(MmuError::ThreadTerminated));
                    }
                    match outcome {
                        FaultOutcome::OutOfFrames => {
                            return Poll::Ready(Err(MmuError::OutOfFrames))
                        }
                        FaultOutcome::Failure(FailureCause::Io) => {
                            return Poll::Ready(Err(MmuError::IoFailed(self.page)))
                        }
                        FaultOutcome::Failure(FailureCause::ThreadTerminated) => {
                            return Poll::Ready(Err(MmuError::ThreadTerminated))
                        }
                        FaultOutcome::Success
                        | FaultOutcome::Failure(FailureCause::AlreadyValid) => {
                            self.state = State::Check
                        }
                    }
                }
                State::Waiting => {
                    if sched.status(self.thread).is_killed() {
                        return Poll::Ready(Err(MmuError::ThreadTerminated));
                    }
                    self.state = State::Check;
                }
            }
        }
    }
}
