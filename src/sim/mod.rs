//! A cooperative uniprocessor that drives the paging core: it owns the run
//! queue, the wait-sets, the I/O device and the task table.
//!
//! Exactly one thread runs per step. A thread gives the processor up only
//! when the operation it runs suspends or finishes.


use std::collections::{BTreeMap, VecDeque};

use log::{debug, info};

use crate::{
    config::MmuConfig,
    mmu::{InvariantViolation, Mmu, Reference},
    page_lock::PageLock,
    sched::{IoRequest, Poll, Scheduler, Suspend, WaitSets},
    swap::BackingStore,
    AccessKind, MmuError, PageId, SpaceId, ThreadId, ThreadStatus, WaitId,
};

pub const DEFAULT_IO_LATENCY: u64 = 2;

/// One step of a thread's program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read(u32),
    Write(u32, u8),
    /// Pin a page (by page number) of the thread's own space.
    Lock(usize),
    Unlock(usize),
}

#[derive(Debug, PartialEq)]
pub enum Event {
    Read {
        thread: ThreadId,
        address: u32,
        value: u8,
    },
    Wrote {
        thread: ThreadId,
        address: u32,
        value: u8,
    },
    Locked {
        thread: ThreadId,
        page: PageId,
    },
    Unlocked {
        thread: ThreadId,
        page: PageId,
    },
    Failed {
        thread: ThreadId,
        op: Op,
        error: MmuError,
    },
    /// The thread was killed before the operation could complete.
    Abandoned {
        thread: ThreadId,
        op: Op,
    },
    Exited {
        thread: ThreadId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Parked(WaitId),
    Finished,
}

#[derive(Debug, Clone)]
enum Running {
    Reference(Reference, Op),
    Lock(PageLock, Op),
}

#[derive(Debug)]
struct SimThread {
    space: SpaceId,
    status: ThreadStatus,
    state: ThreadState,
    ops: VecDeque<Op>,
    current: Option<Running>,
}

#[derive(Debug, Default)]
struct Dispatch {
    threads: BTreeMap<ThreadId, SimThread>,
    run_queue: VecDeque<ThreadId>,
    waits: WaitSets,
    io_queue: VecDeque<(u64, IoRequest)>,
    clock: u64,
    io_latency: u64,
}

impl Dispatch {
    fn make_ready(&mut self, thread: ThreadId) {
        if let Some(t) = self.threads.get_mut(&thread) {
            if t.state != ThreadState::Finished {
                t.state = ThreadState::Ready;
                self.run_queue.push_back(thread);
            }
        }
    }

    fn pop_io(&mut self, only_due: bool) -> Option<IoRequest> {
        match self.io_queue.front() {
            Some((due, _)) if !only_due || *due <= self.clock => {
                self.io_queue.pop_front().map(|(_, request)| request)
            }
            _ => None,
        }
    }
}

impl Scheduler for Dispatch {
    fn status(&self, thread: ThreadId) -> ThreadStatus {
        self.threads
            .get(&thread)
            .map(|t| t.status)
            .unwrap_or(ThreadStatus::Killed)
    }

    fn space_of(&self, thread: ThreadId) -> Option<SpaceId> {
        self.threads.get(&thread).map(|t| t.space)
    }

    fn notify_all(&mut self, wait: WaitId) {
        for thread in self.waits.wake_all(wait) {
            debug!("{:?} wakes {}", wait, thread);
            self.make_ready(thread);
        }
    }

    fn start_io(&mut self, request: IoRequest) {
        debug!(
            "{} starts {:?} on {}",
            request.thread, request.kind, request.frame
        );
        self.io_queue
            .push_back((self.clock + self.io_latency, request));
    }
}

pub struct Simulator<S: BackingStore> {
    mmu: Mmu,
    store: S,
    dispatch: Dispatch,
    events: Vec<Event>,
    next_thread: u32,
    next_space: u32,
}

impl<S: BackingStore> Simulator<S> {
    pub fn new(config: MmuConfig, store: S) -> Result<Self, MmuError> {
        Ok(Simulator {
            mmu: Mmu::new(config)?,
            store,
            dispatch: Dispatch {
                io_latency: DEFAULT_IO_LATENCY,
                ..Dispatch::default()
            },
            events: Vec::new(),
            next_thread: 0,
            next_space: 0,
        })
    }

    /// Steps between issuing a backing-store transfer and its completion.
    pub fn with_io_latency(mut self, steps: u64) -> Self {
        self.dispatch.io_latency = steps;
        self
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> u64 {
        self.dispatch.clock
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.mmu.check_invariants()
    }

    pub fn threads(&self) -> impl Iterator<Item = (ThreadId, SpaceId, ThreadState)> + '_ {
        self.dispatch
            .threads
            .iter()
            .map(|(id, t)| (*id, t.space, t.state))
    }

    pub fn thread_state(&self, thread: ThreadId) -> Option<ThreadState> {
        self.dispatch.threads.get(&thread).map(|t| t.state)
    }

    pub fn thread_status(&self, thread: ThreadId) -> ThreadStatus {
        self.dispatch.status(thread)
    }

    pub fn pending_io(&self) -> usize {
        self.dispatch.io_queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.dispatch.run_queue.is_empty() && self.dispatch.io_queue.is_empty()
    }

    pub fn create_space(&mut self) -> Result<SpaceId, MmuError> {
        let space = SpaceId(self.next_space);
        self.store.attach(space)?;
        self.mmu.create_page_table(space)?;
        self.next_space += 1;
        info!("Created {}", space);
        Ok(space)
    }

    /// Kill every thread of `space`, then tear its memory down.
    pub fn destroy_space(&mut self, space: SpaceId) -> Result<(), MmuError> {
        if !self.mmu.has_space(space) {
            return Err(MmuError::UnknownSpace(space));
        }
        for thread in self.dispatch.threads.values_mut() {
            if thread.space == space {
                thread.status = ThreadStatus::Killed;
            }
        }
        self.mmu.deallocate_memory(space)?;
        self.store.detach(space);
        info!("Destroyed {}", space);
        Ok(())
    }

    pub fn spawn(&mut self, space: SpaceId, ops: Vec<Op>) -> Result<ThreadId, MmuError> {
        if !self.mmu.has_space(space) {
            return Err(MmuError::UnknownSpace(space));
        }
        let id = ThreadId(self.next_thread);
        self.next_thread += 1;
        self.dispatch.threads.insert(
            id,
            SimThread {
                space,
                status: ThreadStatus::Alive,
                state: ThreadState::Ready,
                ops: ops.into(),
                current: None,
            },
        );
        self.dispatch.run_queue.push_back(id);
        debug!("Spawned {} in {}", id, space);
        Ok(id)
    }

    /// Mark a thread killed. A parked thread notices once it is woken.
    pub fn kill(&mut self, thread: ThreadId) -> Result<(), MmuError> {
        let t = self
            .dispatch
            .threads
            .get_mut(&thread)
            .ok_or(MmuError::UnknownThread(thread))?;
        t.status = ThreadStatus::Killed;
        info!("Killed {}", thread);
        Ok(())
    }

    /// Run one thread for one poll, or complete one transfer. Returns false
    /// when there is nothing left to do.
    pub fn step(&mut self) -> bool {
        self.dispatch.clock += 1;
        if let Some(request) = self.dispatch.pop_io(true) {
            self.complete_io(request);
            return true;
        }
        while let Some(thread) = self.dispatch.run_queue.pop_front() {
            let runnable = self
                .dispatch
                .threads
                .get(&thread)
                .map(|t| t.state == ThreadState::Ready)
                .unwrap_or(false);
            if runnable {
                self.run_thread(thread);
                return true;
            }
        }
        // Nobody can run: let the device catch up.
        if let Some(request) = self.dispatch.pop_io(false) {
            self.complete_io(request);
            return true;
        }
        false
    }

    /// Step until idle. Returns the number of steps taken.
    pub fn run(&mut self) -> usize {
        let mut steps = 0;
        while self.step() {
            steps += 1;
        }
        steps
    }

    fn complete_io(&mut self, request: IoRequest) {
        self.mmu.complete_io(&request, &mut self.store);
        self.dispatch.notify_all(request.wait);
    }

    fn run_thread(&mut self, id: ThreadId) {
        let Some(thread) = self.dispatch.threads.get_mut(&id) else {
            return;
        };
        let running = match thread.current.take() {
            Some(running) => running,
            None => {
                let next = if thread.status.is_killed() {
                    None
                } else {
                    thread.ops.pop_front()
                };
                let Some(op) = next else {
                    thread.state = ThreadState::Finished;
                    self.events.push(Event::Exited { thread: id });
                    debug!("{} exited", id);
                    return;
                };
                let space = thread.space;
                match op {
                    Op::Read(address) => {
                        Running::Reference(self.mmu.access(id, address, AccessKind::Read), op)
                    }
                    Op::Write(address, _) => {
                        Running::Reference(self.mmu.access(id, address, AccessKind::Write), op)
                    }
                    Op::Lock(page) => {
                        Running::Lock(self.mmu.lock(id, PageId::new(space, page)), op)
                    }
                    Op::Unlock(page) => {
                        let page = PageId::new(space, page);
                        let event = match self.mmu.unlock(page) {
                            Ok(()) => Event::Unlocked { thread: id, page },
                            Err(error) => Event::Failed {
                                thread: id,
                                op,
                                error,
                            },
                        };
                        self.events.push(event);
                        self.dispatch.run_queue.push_back(id);
                        return;
                    }
                }
            }
        };
        self.poll_running(id, running);
    }

    fn poll_running(&mut self, id: ThreadId, mut running: Running) {
        let poll = match &mut running {
            Running::Reference(reference, op) => {
                match reference.poll(&mut self.mmu, &mut self.dispatch) {
                    Poll::Ready(result) => Poll::Ready(self.finish_reference(id, *op, result)),
                    Poll::Pending(suspend) => Poll::Pending(suspend),
                }
            }
            Running::Lock(lock, op) => match lock.poll(&mut self.mmu, &mut self.dispatch) {
                Poll::Ready(result) => {
                    let event = match result {
                        Ok(()) => Event::Locked {
                            thread: id,
                            page: lock.page(),
                        },
                        Err(MmuError::ThreadTerminated) => Event::Abandoned { thread: id, op: *op },
                        Err(error) => Event::Failed {
                            thread: id,
                            op: *op,
                            error,
                        },
                    };
                    Poll::Ready(event)
                }
                Poll::Pending(suspend) => Poll::Pending(suspend),
            },
        };

        let Some(thread) = self.dispatch.threads.get_mut(&id) else {
            return;
        };
        match poll {
            Poll::Ready(event) => {
                self.events.push(event);
                self.dispatch.run_queue.push_back(id);
            }
            Poll::Pending(Suspend::Yield) => {
                thread.current = Some(running);
                self.dispatch.run_queue.push_back(id);
            }
            Poll::Pending(Suspend::Wait(wait)) => {
                thread.current = Some(running);
                thread.state = ThreadState::Parked(wait);
                self.dispatch.waits.park(id, wait);
            }
        }
    }

    fn finish_reference(
        &mut self,
        id: ThreadId,
        op: Op,
        result: Result<PageId, MmuError>,
    ) -> Event {
        if let Err(error) = result {
            return Event::Failed { thread: id, op, error };
        }
        if self.dispatch.status(id).is_killed() {
            return Event::Abandoned { thread: id, op };
        }
        let Some(space) = self.dispatch.space_of(id) else {
            return Event::Abandoned { thread: id, op };
        };
        let (address, written) = match op {
            Op::Read(address) => (address, None),
            Op::Write(address, value) => (address, Some(value)),
            Op::Lock(_) | Op::Unlock(_) => return Event::Abandoned { thread: id, op },
        };
        let Some(physical) = self.mmu.physical_address(space, address) else {
            return Event::Abandoned { thread: id, op };
        };
        let outcome = match written {
            Some(value) => self
                .mmu
                .write_physical(physical, value)
                .map(|()| Event::Wrote {
                    thread: id,
                    address,
                    value,
                }),
            None => self.mmu.read_physical(physical).map(|value| Event::Read {
                thread: id,
                address,
                value,
            }),
        };
        outcome.unwrap_or_else(|error| Event::Failed { thread: id, op, error })
    }
}
