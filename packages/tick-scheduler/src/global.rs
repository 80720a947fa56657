//! The thread's installed scheduler and free functions over it.

use crate::Defer;
use crate::bound::BoundValue;
use crate::error::DeferError;
use crate::scheduler::{Handler, Scheduler};
use crate::task::{CallbackOutcome, TickFuture};
use std::cell::RefCell;
use tick_host::ExecutionContext;

thread_local! {
    static CURRENT: RefCell<Option<Scheduler>> = RefCell::new(None);
}

/// Installs `scheduler` for this thread and returns the one it replaces.
pub fn install(scheduler: Scheduler) -> Option<Scheduler> {
    CURRENT.with(|c| c.borrow_mut().replace(scheduler))
}

pub fn uninstall() -> Option<Scheduler> {
    CURRENT.with(|c| c.borrow_mut().take())
}

pub fn current() -> Result<Scheduler, DeferError> {
    CURRENT
        .with(|c| c.borrow().clone())
        .ok_or(DeferError::NotInstalled)
}

pub fn next_tick<F, O>(callback: F, bound: Option<BoundValue>) -> Result<(), DeferError>
where
    F: FnOnce(Option<&BoundValue>) -> O + 'static,
    O: CallbackOutcome,
{
    current()?.register_callback(callback, bound);
    Ok(())
}

pub fn tick(bound: Option<BoundValue>) -> Result<TickFuture, DeferError> {
    Ok(current()?.register_future(bound))
}

pub fn with_low_priority<A: 'static, R: 'static>(
    f: &Handler<A, R>,
) -> Result<Handler<A, R>, DeferError> {
    Ok(current()?.wrap_low_priority(f))
}

/// Context-scoped registration; `None` targets the global context.
pub fn next_tick_in<F, O>(
    context: Option<&ExecutionContext>,
    callback: F,
    bound: Option<BoundValue>,
) -> Result<(), DeferError>
where
    F: FnOnce(Option<&BoundValue>) -> O + 'static,
    O: CallbackOutcome,
{
    current()?.for_context(context).next_tick(callback, bound)
}

pub fn tick_in(
    context: Option<&ExecutionContext>,
    bound: Option<BoundValue>,
) -> Result<TickFuture, DeferError> {
    current()?.for_context(context).tick(bound)
}
