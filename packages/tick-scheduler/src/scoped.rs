use crate::Defer;
use crate::bound::BoundValue;
use crate::error::{DEFERRED_CALLBACK_TAG, DeferError, ErrorSink, TracingSink};
use crate::queue::{FlushQueue, QueueStats};
use crate::scheduler::{Scheduler, SchedulerState};
use crate::selector::{self, Flush, Trigger};
use crate::task::{CallbackOutcome, Thunk, TickFuture};
use std::rc::{Rc, Weak};
use tick_host::{ExecutionContext, Primitive};

/// The flush queue attached to an execution context.
///
/// Owned by the context's extension slot; nothing else keeps a strong
/// reference, so closing the context drops the queue and its pending thunks.
pub(crate) struct ContextQueue {
    name: String,
    queue: FlushQueue,
    trigger: Trigger,
    owner: Weak<SchedulerState>,
}

impl ContextQueue {
    fn attach(context: &ExecutionContext, scheduler: &Scheduler) -> Result<Rc<Self>, DeferError> {
        if context.is_closed() {
            return Err(DeferError::ContextClosed(context.name().to_string()));
        }
        if let Some(queue) = context.extension::<ContextQueue>() {
            return Ok(queue);
        }

        let host = context.event_loop();
        let caps = scheduler.state().config().mask(host.probe());
        let owner = Rc::downgrade(scheduler.state());

        let queue = Rc::new_cyclic(|weak: &Weak<ContextQueue>| {
            let weak = weak.clone();
            let flush: Flush = Rc::new(move || {
                if let Some(queue) = weak.upgrade() {
                    queue.flush();
                }
            });
            ContextQueue {
                name: context.name().to_string(),
                queue: FlushQueue::new(),
                trigger: selector::select_low(&caps, host, flush),
                owner,
            }
        });

        context
            .insert_extension(queue.clone())
            .map_err(|_| DeferError::ContextClosed(context.name().to_string()))?;

        tracing::debug!(
            context = %queue.name,
            primitive = ?queue.trigger.primitive(),
            "attached flush queue to execution context"
        );
        Ok(queue)
    }

    fn defer(&self, thunk: Thunk) {
        if self.queue.append(thunk) {
            self.trigger.fire();
        }
    }

    fn flush(&self) {
        let sink: Rc<dyn ErrorSink> = match self.owner.upgrade() {
            Some(state) => state.error_sink(),
            None => Rc::new(TracingSink),
        };
        let ran = self.queue.drain(&*sink, DEFERRED_CALLBACK_TAG);
        tracing::trace!(context = %self.name, ran, "drained context callbacks");
    }
}

/// A view of the scheduler bound to one execution context.
///
/// Same contract as the process-wide scheduler, but batches live on the
/// context and are always armed through the context host's low-priority
/// trigger.
pub struct ScopedScheduler<'a> {
    scheduler: &'a Scheduler,
    context: &'a ExecutionContext,
}

impl<'a> ScopedScheduler<'a> {
    pub fn context(&self) -> &'a ExecutionContext {
        self.context
    }

    pub fn pending(&self) -> usize {
        self.context
            .extension::<ContextQueue>()
            .map_or(0, |queue| queue.queue.len())
    }

    /// `None` until the first registration attaches a queue.
    pub fn stats(&self) -> Option<QueueStats> {
        self.context
            .extension::<ContextQueue>()
            .map(|queue| queue.queue.stats())
    }

    pub fn trigger_primitive(&self) -> Option<Primitive> {
        self.context
            .extension::<ContextQueue>()
            .map(|queue| queue.trigger.primitive())
    }
}

impl Defer for ScopedScheduler<'_> {
    fn submit(&self, thunk: Thunk) -> Result<(), DeferError> {
        ContextQueue::attach(self.context, self.scheduler)?.defer(thunk);
        Ok(())
    }
}

impl Scheduler {
    /// Scoped view on `context`, or on the global context when `None`.
    pub fn for_context<'a>(&'a self, context: Option<&'a ExecutionContext>) -> ScopedScheduler<'a> {
        ScopedScheduler {
            scheduler: self,
            context: context.unwrap_or_else(|| self.global_context()),
        }
    }

    pub fn register_for_context<F, O>(
        &self,
        context: Option<&ExecutionContext>,
        callback: F,
        bound: Option<BoundValue>,
    ) -> Result<(), DeferError>
    where
        F: FnOnce(Option<&BoundValue>) -> O + 'static,
        O: CallbackOutcome,
    {
        self.for_context(context).next_tick(callback, bound)
    }

    pub fn register_future_for_context(
        &self,
        context: Option<&ExecutionContext>,
        bound: Option<BoundValue>,
    ) -> Result<TickFuture, DeferError> {
        self.for_context(context).tick(bound)
    }
}
