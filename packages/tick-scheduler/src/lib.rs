pub mod bound;
pub mod config;
pub mod error;
pub mod global;
pub mod queue;
pub mod scheduler;
pub mod scoped;
pub mod selector;
pub mod task;

/// The registration contract shared by the process-wide scheduler and its
/// context-scoped views.
pub trait Defer {
    /// Queues a thunk for the next flush, arming a wake-up if it opens a batch.
    fn submit(&self, thunk: Thunk) -> Result<(), DeferError>;

    /// Runs `callback` with `bound` on a later turn.
    fn next_tick<F, O>(&self, callback: F, bound: Option<BoundValue>) -> Result<(), DeferError>
    where
        Self: Sized,
        F: FnOnce(Option<&BoundValue>) -> O + 'static,
        O: CallbackOutcome,
    {
        self.submit(Thunk::callback(callback, bound))
    }

    /// Resolves with `bound` once the batch holding it has drained.
    fn tick(&self, bound: Option<BoundValue>) -> Result<TickFuture, DeferError>
    where
        Self: Sized,
    {
        let (thunk, future) = Thunk::resolver(bound);
        self.submit(thunk)?;
        Ok(future)
    }
}

impl Defer for Scheduler {
    fn submit(&self, thunk: Thunk) -> Result<(), DeferError> {
        self.defer(thunk);
        Ok(())
    }
}

pub use bound::BoundValue;
pub use config::SchedulerConfig;
pub use error::{CallbackError, DEFERRED_CALLBACK_TAG, DeferError, ErrorSink, TracingSink};
pub use queue::{FlushQueue, QueueStats};
pub use scheduler::{Handler, ModeGuard, Scheduler, SchedulerStats};
pub use scoped::ScopedScheduler;
pub use selector::{Tier, Trigger, TriggerPair};
pub use task::{CallbackOutcome, Thunk, TickFuture};
