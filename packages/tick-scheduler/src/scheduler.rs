use crate::bound::BoundValue;
use crate::config::SchedulerConfig;
use crate::error::{DEFERRED_CALLBACK_TAG, ErrorSink, TracingSink};
use crate::queue::{FlushQueue, QueueStats};
use crate::selector::{self, Flush, Tier, TriggerPair};
use crate::task::{CallbackOutcome, Thunk, TickFuture};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};
use tick_host::{CapabilitySet, EventLoop, ExecutionContext};

/// A shareable callable, compared by `Rc` identity when wrapped.
pub type Handler<A, R> = Rc<dyn Fn(A) -> R>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub high_arms: u64,
    pub low_arms: u64,
    pub queue: QueueStats,
}

type WrapperKey = (TypeId, usize);

// Weak on both sides. Handlers usually capture a `Scheduler`, so the cache
// must not keep them alive.
struct WrapperSlot<A, R> {
    wrapper: Weak<dyn Fn(A) -> R>,
    target: Weak<dyn Fn(A) -> R>,
}

trait CachedWrapper {
    fn is_live(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<A: 'static, R: 'static> CachedWrapper for WrapperSlot<A, R> {
    fn is_live(&self) -> bool {
        self.wrapper.strong_count() > 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<A: 'static, R: 'static> WrapperSlot<A, R> {
    fn lookup(&self, f: &Handler<A, R>) -> Option<Handler<A, R>> {
        let target = self.target.upgrade()?;
        let wrapper = self.wrapper.upgrade()?;
        Rc::ptr_eq(&target, f).then_some(wrapper)
    }
}

pub(crate) struct SchedulerState {
    host: EventLoop,
    config: SchedulerConfig,
    capabilities: CapabilitySet,
    queue: FlushQueue,
    mode: Cell<Tier>,
    triggers: OnceCell<TriggerPair>,
    pub(crate) sink: RefCell<Rc<dyn ErrorSink>>,
    wrappers: RefCell<FxHashMap<WrapperKey, Box<dyn CachedWrapper>>>,
    global_context: ExecutionContext,
    stats: Cell<SchedulerStats>,
}

impl SchedulerState {
    pub(crate) fn error_sink(&self) -> Rc<dyn ErrorSink> {
        self.sink.borrow().clone()
    }

    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn flush(&self) {
        // Cloned so a callback may swap the sink mid-drain.
        let sink = self.error_sink();
        let ran = self.queue.drain(&*sink, DEFERRED_CALLBACK_TAG);
        tracing::trace!(ran, pending = self.queue.len(), "drained deferred callbacks");

        if ran > self.config.slow_batch_threshold {
            tracing::warn!(
                ran,
                threshold = self.config.slow_batch_threshold,
                "oversized deferred-callback batch"
            );
        }
    }

    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

/// Restores the previous tier when dropped, including during unwinding.
pub struct ModeGuard<'a> {
    mode: &'a Cell<Tier>,
    prior: Tier,
}

impl<'a> ModeGuard<'a> {
    fn enter(mode: &'a Cell<Tier>, tier: Tier) -> Self {
        let prior = mode.replace(tier);
        Self { mode, prior }
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.mode.set(self.prior);
    }
}

/// The process-wide deferred-callback scheduler.
///
/// Callbacks registered during a turn are collected into one batch and run
/// together on a later turn of the host loop. The first registration of a
/// batch arms a single wake-up on the tier picked by the current mode:
/// high priority is a promise microtask where the host has a native one,
/// low priority is the best macrotask primitive available.
///
/// Handles are cheap to clone and all refer to the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerState>,
}

impl Scheduler {
    pub fn new(host: &EventLoop) -> Self {
        Self::with_config(host, SchedulerConfig::default())
    }

    pub fn with_config(host: &EventLoop, config: SchedulerConfig) -> Self {
        let capabilities = config.mask(host.probe());
        tracing::debug!(?capabilities, ?config, "creating scheduler");

        Self {
            inner: Rc::new(SchedulerState {
                host: host.clone(),
                mode: Cell::new(config.initial_tier),
                config,
                capabilities,
                queue: FlushQueue::new(),
                triggers: OnceCell::new(),
                sink: RefCell::new(Rc::new(TracingSink)),
                wrappers: RefCell::new(FxHashMap::default()),
                global_context: ExecutionContext::new(host, "global"),
                stats: Cell::new(SchedulerStats::default()),
            }),
        }
    }

    pub(crate) fn state(&self) -> &Rc<SchedulerState> {
        &self.inner
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.host
    }

    /// The probed capabilities after config masking.
    pub fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Context used by the scoped variant when none is given.
    pub fn global_context(&self) -> &ExecutionContext {
        &self.inner.global_context
    }

    pub fn current_tier(&self) -> Tier {
        self.inner.mode.get()
    }

    pub fn set_error_sink(&self, sink: impl ErrorSink + 'static) {
        *self.inner.sink.borrow_mut() = Rc::new(sink);
    }

    /// Triggers for both tiers, selected on first use and kept for the
    /// scheduler's lifetime.
    pub fn triggers(&self) -> &TriggerPair {
        self.inner.triggers.get_or_init(|| {
            let weak = Rc::downgrade(&self.inner);
            let flush: Flush = Rc::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.flush();
                }
            });
            selector::select(&self.inner.capabilities, &self.inner.host, flush)
        })
    }

    pub fn register_callback<F, O>(&self, callback: F, bound: Option<BoundValue>)
    where
        F: FnOnce(Option<&BoundValue>) -> O + 'static,
        O: CallbackOutcome,
    {
        self.defer(Thunk::callback(callback, bound));
    }

    pub fn register_future(&self, bound: Option<BoundValue>) -> TickFuture {
        let (thunk, future) = Thunk::resolver(bound);
        self.defer(thunk);
        future
    }

    pub fn defer(&self, thunk: Thunk) {
        if self.inner.queue.append(thunk) {
            self.arm();
        }
    }

    fn arm(&self) {
        let tier = self.inner.mode.get();
        let trigger = self.triggers().get(tier);
        tracing::debug!(?tier, primitive = ?trigger.primitive(), "arming deferred flush");

        trigger.fire();
        self.inner.bump(|s| match tier {
            Tier::High => s.high_arms += 1,
            Tier::Low => s.low_arms += 1,
        });
    }

    /// Biases batches armed while the guard lives towards the low tier.
    pub fn enter_low_priority(&self) -> ModeGuard<'_> {
        ModeGuard::enter(&self.inner.mode, Tier::Low)
    }

    pub fn run_low_priority<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter_low_priority();
        f()
    }

    /// Returns a wrapper that calls `f` with the low tier selected.
    ///
    /// Wrapping the same `Rc` again returns the same wrapper for as long as
    /// someone holds it. The cache itself keeps neither side alive.
    pub fn wrap_low_priority<A: 'static, R: 'static>(&self, f: &Handler<A, R>) -> Handler<A, R> {
        let key = (
            TypeId::of::<Handler<A, R>>(),
            Rc::as_ptr(f) as *const () as usize,
        );

        let cached = self.inner.wrappers.borrow().get(&key).and_then(|slot| {
            slot.as_any()
                .downcast_ref::<WrapperSlot<A, R>>()
                .and_then(|slot| slot.lookup(f))
        });
        if let Some(wrapper) = cached {
            return wrapper;
        }

        let weak = Rc::downgrade(&self.inner);
        let target = f.clone();
        let wrapper: Handler<A, R> = Rc::new(move |args: A| match weak.upgrade() {
            Some(state) => {
                let _guard = ModeGuard::enter(&state.mode, Tier::Low);
                target(args)
            }
            None => target(args),
        });

        let slot = WrapperSlot {
            wrapper: Rc::downgrade(&wrapper),
            target: Rc::downgrade(f),
        };

        let mut wrappers = self.inner.wrappers.borrow_mut();
        wrappers.retain(|_, slot| slot.is_live());
        wrappers.insert(key, Box::new(slot));

        wrapper
    }

    /// Entries in the wrapper cache. Dead ones linger until the next wrap.
    pub fn cached_wrappers(&self) -> usize {
        self.inner.wrappers.borrow().len()
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_armed(&self) -> bool {
        self.inner.queue.is_armed()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue: self.inner.queue.stats(),
            ..self.inner.stats.get()
        }
    }
}
