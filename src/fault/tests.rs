use std::collections::{HashMap, HashSet};

use super::*;
use crate::{
    config::MmuConfig,
    swap::{BackingStore, MemorySwap, SwapSlot},
    ThreadStatus,
};

/// Records what the fault asks of the dispatcher and completes nothing on
/// its own.
#[derive(Default)]
struct TestScheduler {
    killed: HashSet<ThreadId>,
    spaces: HashMap<ThreadId, SpaceId>,
    notified: Vec<WaitId>,
    io: Vec<IoRequest>,
}

impl Scheduler for TestScheduler {
    fn status(&self, thread: ThreadId) -> ThreadStatus {
        if self.killed.contains(&thread) {
            ThreadStatus::Killed
        } else {
            ThreadStatus::Alive
        }
    }

    fn space_of(&self, thread: ThreadId) -> Option<SpaceId> {
        self.spaces.get(&thread).copied()
    }

    fn notify_all(&mut self, wait: WaitId) {
        self.notified.push(wait);
    }

    fn start_io(&mut self, request: IoRequest) {
        self.io.push(request);
    }
}

const T0: ThreadId = ThreadId(0);
const S0: SpaceId = SpaceId(0);

fn setup(frames: usize) -> (Mmu, TestScheduler, MemorySwap) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mmu = Mmu::new(MmuConfig::new(12, 4, frames)).unwrap();
    mmu.create_page_table(S0).unwrap();
    let mut sched = TestScheduler::default();
    sched.spaces.insert(T0, S0);
    let mut store = MemorySwap::new();
    store.attach(S0).unwrap();
    (mmu, sched, store)
}

fn page(number: usize) -> PageId {
    PageId::new(S0, number)
}

/// Bring `page` in through a full fault, completing its I/O immediately.
fn fault_in(mmu: &mut Mmu, sched: &mut TestScheduler, store: &mut MemorySwap, page: PageId) {
    let mut fault = mmu.dispatch_fault(AccessKind::Read, page, T0);
    loop {
        match fault.poll(mmu, sched) {
            Poll::Ready(outcome) => {
                assert_eq!(outcome, FaultOutcome::Success);
                return;
            }
            Poll::Pending(Suspend::Wait(_)) => {
                let request = sched.io.pop().unwrap();
                mmu.complete_io(&request, store);
            }
            Poll::Pending(Suspend::Yield) => {}
        }
    }
}

#[test]
fn fault_into_free_frame() {
    let (mut mmu, mut sched, mut store) = setup(2);
    let p = page(3);
    let mut fault = mmu.dispatch_fault(AccessKind::Read, p, T0);
    let event = WaitId::Fault(fault.id());

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(event))
    );
    assert_eq!(sched.io.len(), 1);
    let request = sched.io[0];
    assert_eq!(request.kind, IoKind::SwapIn);
    assert_eq!(request.frame, FrameId(0));
    assert_eq!(request.slot, SwapSlot { space: S0, page: 3 });
    assert_eq!(request.wait, event);

    let entry = mmu.entry(p).unwrap();
    assert!(!entry.is_valid());
    assert_eq!(entry.validating_thread(), Some(T0));
    assert_eq!(entry.frame(), Some(FrameId(0)));
    let frame = mmu.frame(FrameId(0)).unwrap();
    assert_eq!(frame.reserved_by(), Some(S0));
    assert!(frame.is_free());
    assert_eq!(mmu.check_invariants(), Ok(()));

    // A spurious wake-up before the device is done parks again.
    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(event))
    );

    mmu.complete_io(&request, &mut store);
    assert_eq!(fault.poll(&mut mmu, &mut sched), Poll::Pending(Suspend::Yield));
    let entry = mmu.entry(p).unwrap();
    assert!(entry.is_valid());
    assert!(!entry.is_faulting());
    let frame = mmu.frame(FrameId(0)).unwrap();
    assert_eq!(frame.mapped_page(), Some(p));
    assert!(!frame.is_reserved());
    assert!(sched.notified.contains(&WaitId::Page(p)));
    assert!(sched.notified.contains(&event));

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Success)
    );
    assert_eq!(mmu.stats().faults, 1);
    assert_eq!(mmu.stats().swap_ins, 1);
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn already_valid_yields_once() {
    let (mut mmu, mut sched, mut store) = setup(2);
    fault_in(&mut mmu, &mut sched, &mut store, page(1));
    sched.notified.clear();

    let mut fault = mmu.dispatch_fault(AccessKind::Write, page(1), T0);
    assert_eq!(fault.poll(&mut mmu, &mut sched), Poll::Pending(Suspend::Yield));
    assert_eq!(sched.notified, vec![WaitId::Page(page(1))]);
    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Failure(FailureCause::AlreadyValid))
    );
    assert!(sched.io.is_empty());
}

#[test]
fn no_victim_means_out_of_frames() {
    let (mut mmu, mut sched, mut store) = setup(2);
    fault_in(&mut mmu, &mut sched, &mut store, page(0));
    fault_in(&mut mmu, &mut sched, &mut store, page(1));
    mmu.frame_mut(FrameId(0)).unwrap().pin();
    mmu.frame_mut(FrameId(1)).unwrap().reserve(SpaceId(7));

    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(2), T0);
    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::OutOfFrames)
    );
    assert!(!mmu.entry(page(2)).unwrap().is_faulting());
    assert_eq!(mmu.stats().out_of_frames, 1);
    // Nothing was touched.
    assert_eq!(mmu.frame(FrameId(0)).unwrap().mapped_page(), Some(page(0)));
    assert_eq!(
        mmu.frame(FrameId(1)).unwrap().reserved_by(),
        Some(SpaceId(7))
    );
}

#[test]
fn clean_victim_is_evicted_without_write_back() {
    let (mut mmu, mut sched, mut store) = setup(1);
    fault_in(&mut mmu, &mut sched, &mut store, page(0));

    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(5), T0);
    assert!(matches!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(_))
    ));
    assert_eq!(sched.io.len(), 1);
    assert_eq!(sched.io[0].kind, IoKind::SwapIn);
    assert!(!mmu.entry(page(0)).unwrap().is_valid());
    assert_eq!(mmu.entry(page(0)).unwrap().frame(), None);
    assert_eq!(mmu.stats().evictions, 1);
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn dirty_victim_is_written_back_first() {
    let (mut mmu, mut sched, mut store) = setup(1);
    fault_in(&mut mmu, &mut sched, &mut store, page(0));
    mmu.write_physical(4, 0xAB).unwrap();
    mmu.frame_mut(FrameId(0)).unwrap().set_dirty(true);

    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(5), T0);
    assert!(matches!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(_))
    ));
    let write_back = sched.io.pop().unwrap();
    assert_eq!(write_back.kind, IoKind::WriteBack);
    assert_eq!(write_back.slot, SwapSlot { space: S0, page: 0 });
    // The victim stays mapped until its contents are safe.
    assert!(mmu.entry(page(0)).unwrap().is_valid());
    assert_eq!(mmu.frame(FrameId(0)).unwrap().reserved_by(), Some(S0));

    mmu.complete_io(&write_back, &mut store);
    assert!(matches!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(_))
    ));
    assert!(!mmu.entry(page(0)).unwrap().is_valid());
    assert!(!mmu.frame(FrameId(0)).unwrap().is_dirty());
    assert_eq!(
        store.contents(SwapSlot { space: S0, page: 0 }).unwrap()[4],
        0xAB
    );

    let swap_in = sched.io.pop().unwrap();
    assert_eq!(swap_in.kind, IoKind::SwapIn);
    mmu.complete_io(&swap_in, &mut store);
    assert_eq!(fault.poll(&mut mmu, &mut sched), Poll::Pending(Suspend::Yield));
    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Success)
    );
    assert_eq!(mmu.read_physical(4), Ok(0));
    assert_eq!(mmu.stats().write_backs, 1);
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn killed_during_write_back() {
    let (mut mmu, mut sched, mut store) = setup(1);
    fault_in(&mut mmu, &mut sched, &mut store, page(0));
    mmu.frame_mut(FrameId(0)).unwrap().set_dirty(true);

    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(5), T0);
    let _ = fault.poll(&mut mmu, &mut sched);
    let write_back = sched.io.pop().unwrap();
    sched.killed.insert(T0);
    mmu.complete_io(&write_back, &mut store);

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Failure(FailureCause::ThreadTerminated))
    );
    // The victim keeps its frame; the faulting page is left untouched.
    let frame = mmu.frame(FrameId(0)).unwrap();
    assert_eq!(frame.mapped_page(), Some(page(0)));
    assert!(!frame.is_reserved());
    let entry = mmu.entry(page(5)).unwrap();
    assert!(!entry.is_faulting());
    assert_eq!(entry.frame(), None);
    assert!(sched.notified.contains(&WaitId::Page(page(5))));
    assert!(sched.io.is_empty());
    assert_eq!(mmu.stats().unwinds, 1);
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn killed_during_swap_in() {
    let (mut mmu, mut sched, mut store) = setup(2);
    let mut fault = mmu.dispatch_fault(AccessKind::Write, page(2), T0);
    let _ = fault.poll(&mut mmu, &mut sched);
    let swap_in = sched.io.pop().unwrap();
    sched.killed.insert(T0);
    mmu.complete_io(&swap_in, &mut store);

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Failure(FailureCause::ThreadTerminated))
    );
    let entry = mmu.entry(page(2)).unwrap();
    assert!(!entry.is_valid());
    assert!(!entry.is_faulting());
    assert_eq!(entry.frame(), None);
    let frame = mmu.frame(swap_in.frame).unwrap();
    assert!(frame.is_free());
    assert!(!frame.is_reserved());
    assert_eq!(mmu.check_invariants(), Ok(()));

    // Polling a finished fault gives the same answer.
    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Failure(FailureCause::ThreadTerminated))
    );
}

#[test]
fn failed_swap_in_unwinds() {
    let (mut mmu, mut sched, mut store) = setup(2);
    store.fail_slot(SwapSlot { space: S0, page: 6 });
    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(6), T0);
    let _ = fault.poll(&mut mmu, &mut sched);
    let swap_in = sched.io.pop().unwrap();
    mmu.complete_io(&swap_in, &mut store);

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Failure(FailureCause::Io))
    );
    assert!(!mmu.entry(page(6)).unwrap().is_faulting());
    assert!(!mmu.frame(swap_in.frame).unwrap().is_reserved());
    assert_eq!(mmu.stats().swap_ins, 0);
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn space_torn_down_during_swap_in() {
    let (mut mmu, mut sched, mut store) = setup(2);
    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(1), T0);
    let _ = fault.poll(&mut mmu, &mut sched);
    let swap_in = sched.io.pop().unwrap();
    mmu.deallocate_memory(S0).unwrap();
    store.detach(S0);
    mmu.complete_io(&swap_in, &mut store);

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::Failure(FailureCause::ThreadTerminated))
    );
    assert_eq!(mmu.frames().free_frames(), 2);
    assert!(mmu.frames().iter().all(|(_, f)| !f.is_reserved()));
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn victim_pinned_during_write_back_is_spared() {
    let (mut mmu, mut sched, mut store) = setup(1);
    fault_in(&mut mmu, &mut sched, &mut store, page(0));
    mmu.frame_mut(FrameId(0)).unwrap().set_dirty(true);

    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(5), T0);
    let _ = fault.poll(&mut mmu, &mut sched);
    let write_back = sched.io.pop().unwrap();
    // Somebody locks the still-valid victim.
    mmu.frame_mut(FrameId(0)).unwrap().pin();
    mmu.complete_io(&write_back, &mut store);

    assert_eq!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Ready(FaultOutcome::OutOfFrames)
    );
    let frame = mmu.frame(FrameId(0)).unwrap();
    assert_eq!(frame.mapped_page(), Some(page(0)));
    assert!(!frame.is_reserved());
    assert!(mmu.entry(page(0)).unwrap().is_valid());
    assert!(!mmu.entry(page(5)).unwrap().is_faulting());
    assert!(sched.notified.contains(&WaitId::Page(page(5))));
    assert_eq!(mmu.check_invariants(), Ok(()));
}

#[test]
fn victim_written_during_write_back_goes_out_again() {
    let (mut mmu, mut sched, mut store) = setup(1);
    fault_in(&mut mmu, &mut sched, &mut store, page(0));
    mmu.frame_mut(FrameId(0)).unwrap().set_dirty(true);

    let mut fault = mmu.dispatch_fault(AccessKind::Read, page(5), T0);
    let _ = fault.poll(&mut mmu, &mut sched);
    let first = sched.io.pop().unwrap();
    assert!(!mmu.frame(FrameId(0)).unwrap().is_dirty());
    // A store to the victim lands while the old contents go out.
    mmu.write_physical(9, 0x5A).unwrap();
    mmu.frame_mut(FrameId(0)).unwrap().set_dirty(true);
    mmu.complete_io(&first, &mut store);

    assert!(matches!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(_))
    ));
    let second = sched.io.pop().unwrap();
    assert_eq!(second.kind, IoKind::WriteBack);
    assert_eq!(second.frame, FrameId(0));
    assert!(mmu.entry(page(0)).unwrap().is_valid());

    mmu.complete_io(&second, &mut store);
    assert!(matches!(
        fault.poll(&mut mmu, &mut sched),
        Poll::Pending(Suspend::Wait(_))
    ));
    assert!(!mmu.entry(page(0)).unwrap().is_valid());
    assert_eq!(
        store.contents(SwapSlot { space: S0, page: 0 }).unwrap()[9],
        0x5A
    );
    assert_eq!(mmu.stats().write_backs, 2);
}
