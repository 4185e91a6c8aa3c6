//! The seam between the paging core and whoever schedules threads.
//!
//! Every paging operation is a state machine. Polling it either finishes
//! with a value or asks the dispatcher to suspend the calling thread; the
//! dispatcher polls it again once the thread is runnable. The core never
//! parks a thread by itself.

use std::collections::{BTreeMap, BTreeSet};

use crate::{FrameId, IoId, SpaceId, ThreadId, ThreadStatus, WaitId};
use crate::swap::SwapSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Park on a wait-set until somebody notifies it.
    Wait(WaitId),
    /// Stay runnable but let other threads go first.
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending(Suspend),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Backing store into frame.
    SwapIn,
    /// Frame into backing store.
    WriteBack,
}

/// A transfer between a frame and a backing-store slot. When it completes
/// the device hands it to `Mmu::complete_io` and notifies `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequest {
    pub id: IoId,
    pub kind: IoKind,
    pub thread: ThreadId,
    pub frame: FrameId,
    pub slot: SwapSlot,
    pub wait: WaitId,
}

pub trait Scheduler {
    fn status(&self, thread: ThreadId) -> ThreadStatus;

    fn space_of(&self, thread: ThreadId) -> Option<SpaceId>;

    /// Make every thread parked on `wait` runnable again.
    fn notify_all(&mut self, wait: WaitId);

    /// Queue a backing-store transfer. It completes asynchronously.
    fn start_io(&mut self, request: IoRequest);
}

/// Wait-sets keyed by the identity of the object waited on.
#[derive(Debug, Default, Clone)]
pub struct WaitSets {
    parked: BTreeMap<WaitId, BTreeSet<ThreadId>>,
}

impl WaitSets {
    pub fn park(&mut self, thread: ThreadId, wait: WaitId) {
        self.parked.entry(wait).or_default().insert(thread);
    }

    /// Every thread parked on `wait`, in no particular order.
    pub fn wake_all(&mut self, wait: WaitId) -> Vec<ThreadId> {
        self.parked
            .remove(&wait)
            .map(|threads| threads.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn is_parked(&self, thread: ThreadId) -> bool {
        self.parked.values().any(|threads| threads.contains(&thread))
    }

    pub fn waiters(&self, wait: WaitId) -> usize {
        self.parked.get(&wait).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}
