use crate::capability::{Availability, CapabilitySet, Primitive};
use crate::channel::{PortId, PortSlot};
use crate::error::HostError;
use crate::queue::{Job, TaskQueue};
use serde::Serialize;
use slotmap::{SlotMap, new_key_type};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

new_key_type! {
    pub struct TimerId;
}

/// The task source a macrotask was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskSource {
    Immediate,
    Message,
    Timer,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub turns: u64,
    pub microtasks_queued: u64,
    pub microtasks_run: u64,
    pub immediates_queued: u64,
    pub messages_posted: u64,
    pub timers_set: u64,
    pub timers_cleared: u64,
}

struct TimerEntry {
    deadline: u64,
    seq: u64,
    job: Job,
}

pub(crate) struct Delivery {
    pub(crate) port: PortId,
    pub(crate) data: serde_json::Value,
}

pub(crate) struct LoopInner {
    capabilities: CapabilitySet,
    microtasks: TaskQueue,
    immediates: TaskQueue,
    deliveries: RefCell<VecDeque<Delivery>>,
    timers: RefCell<SlotMap<TimerId, TimerEntry>>,
    pub(crate) ports: RefCell<SlotMap<PortId, PortSlot>>,
    clock: Cell<u64>,
    seq: Cell<u64>,
    stats: Cell<HostStats>,
}

impl LoopInner {
    fn bump(&self, f: impl FnOnce(&mut HostStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

/// A single-threaded host event loop.
///
/// Each turn runs one macrotask, taken from the first non-empty source in the
/// order immediates, message deliveries, timers. Microtasks are drained to
/// completion before and after every macrotask. Time is virtual: when only
/// timers remain, the clock jumps to the earliest deadline.
///
/// Primitives the host only polyfills are still usable, but they are
/// delivered through the timer source and carry no priority guarantee.
#[derive(Clone)]
pub struct EventLoop {
    pub(crate) inner: Rc<LoopInner>,
}

impl EventLoop {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            inner: Rc::new(LoopInner {
                capabilities,
                microtasks: TaskQueue::new(),
                immediates: TaskQueue::new(),
                deliveries: RefCell::new(VecDeque::new()),
                timers: RefCell::new(SlotMap::with_key()),
                ports: RefCell::new(SlotMap::with_key()),
                clock: Cell::new(0),
                seq: Cell::new(0),
                stats: Cell::new(HostStats::default()),
            }),
        }
    }

    /// Reports what this host offers. Has no side effects.
    pub fn probe(&self) -> CapabilitySet {
        self.inner.capabilities
    }

    /// Virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.inner.clock.get()
    }

    pub fn stats(&self) -> HostStats {
        self.inner.stats.get()
    }

    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn queue_microtask(&self, job: Job) -> Result<(), HostError> {
        match self.inner.capabilities.resolved_promise {
            Availability::Absent => Err(HostError::Unsupported(Primitive::ResolvedPromise)),
            Availability::Polyfilled => {
                self.set_timeout(0, job);
                Ok(())
            }
            Availability::Native | Availability::VendorNative => {
                self.inner.microtasks.push(job);
                self.inner.bump(|s| s.microtasks_queued += 1);
                Ok(())
            }
        }
    }

    pub fn set_immediate(&self, job: Job) -> Result<(), HostError> {
        match self.inner.capabilities.set_immediate {
            Availability::Absent => Err(HostError::Unsupported(Primitive::SetImmediate)),
            Availability::Polyfilled => {
                self.set_timeout(0, job);
                Ok(())
            }
            Availability::Native | Availability::VendorNative => {
                self.inner.immediates.push(job);
                self.inner.bump(|s| s.immediates_queued += 1);
                Ok(())
            }
        }
    }

    pub fn set_timeout(&self, delay_ms: u64, job: Job) -> TimerId {
        let seq = self.inner.seq.get();
        self.inner.seq.set(seq + 1);
        let deadline = self.now().saturating_add(delay_ms);
        self.inner.bump(|s| s.timers_set += 1);
        self.inner
            .timers
            .borrow_mut()
            .insert(TimerEntry { deadline, seq, job })
    }

    /// Returns false if the timer already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let removed = self.inner.timers.borrow_mut().remove(id).is_some();
        if removed {
            self.inner.bump(|s| s.timers_cleared += 1);
        }
        removed
    }

    pub(crate) fn enqueue_delivery(&self, delivery: Delivery) {
        self.inner.bump(|s| s.messages_posted += 1);
        match self.inner.capabilities.message_channel {
            Availability::Polyfilled => {
                let host = self.clone();
                self.set_timeout(0, Box::new(move || host.deliver(delivery)));
            }
            _ => self.inner.deliveries.borrow_mut().push_back(delivery),
        }
    }

    fn deliver(&self, delivery: Delivery) {
        // Clone the handler out so it can post or close ports while running.
        let handler = self
            .inner
            .ports
            .borrow()
            .get(delivery.port)
            .and_then(|slot| slot.onmessage.clone());

        match handler {
            Some(handler) => handler(delivery.data),
            None => tracing::trace!("dropping message for closed or unattended port"),
        }
    }

    /// Runs microtasks until none are left.
    pub fn perform_microtask_checkpoint(&self) -> usize {
        let ran = self.inner.microtasks.run_until_empty();
        if ran > 0 {
            self.inner.bump(|s| s.microtasks_run += ran as u64);
        }
        ran
    }

    fn next_macrotask(&self) -> Option<(TaskSource, Job)> {
        if let Some(job) = self.inner.immediates.pop() {
            return Some((TaskSource::Immediate, job));
        }

        let delivery = self.inner.deliveries.borrow_mut().pop_front();
        if let Some(delivery) = delivery {
            let host = self.clone();
            return Some((TaskSource::Message, Box::new(move || host.deliver(delivery))));
        }

        let mut timers = self.inner.timers.borrow_mut();
        let next = timers
            .iter()
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(id, _)| id)?;
        let entry = timers.remove(next)?;
        drop(timers);

        if entry.deadline > self.now() {
            self.inner.clock.set(entry.deadline);
        }
        Some((TaskSource::Timer, entry.job))
    }

    /// Runs one turn. Returns the source of the macrotask that ran, or `None`
    /// if only microtasks (or nothing) were pending.
    pub fn run_turn(&self) -> Option<TaskSource> {
        self.perform_microtask_checkpoint();

        let (source, job) = self.next_macrotask()?;
        let turn = self.inner.stats.get().turns + 1;
        tracing::trace!(turn, ?source, now = self.now(), "running macrotask");

        job();
        self.perform_microtask_checkpoint();
        self.inner.bump(|s| s.turns += 1);
        Some(source)
    }

    /// Runs turns until every source is empty. Returns the number of
    /// macrotasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut turns = 0;
        while self.run_turn().is_some() {
            turns += 1;
        }
        turns
    }

    pub fn is_idle(&self) -> bool {
        self.inner.microtasks.is_empty()
            && self.inner.immediates.is_empty()
            && self.inner.deliveries.borrow().is_empty()
            && self.inner.timers.borrow().is_empty()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }
}
