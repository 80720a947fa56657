use crate::bound::BoundValue;
use crate::error::{CallbackError, DeferError, ErrorSink};
use futures::channel::oneshot;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// What a deferred callback may return: `()` or a `Result` whose error
/// converts into `anyhow::Error`.
pub trait CallbackOutcome {
    fn into_result(self) -> anyhow::Result<()>;
}

impl CallbackOutcome for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> CallbackOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

type Callback = Box<dyn FnOnce(Option<&BoundValue>) -> anyhow::Result<()>>;

enum Action {
    Call(Callback),
    Resolve(oneshot::Sender<Option<BoundValue>>),
}

/// One unit of deferred work.
pub struct Thunk {
    bound: Option<BoundValue>,
    action: Action,
}

impl Thunk {
    pub fn callback<F, O>(callback: F, bound: Option<BoundValue>) -> Self
    where
        F: FnOnce(Option<&BoundValue>) -> O + 'static,
        O: CallbackOutcome,
    {
        Self {
            bound,
            action: Action::Call(Box::new(move |bound| callback(bound).into_result())),
        }
    }

    /// A thunk that completes the returned future with `bound` when it runs.
    pub fn resolver(bound: Option<BoundValue>) -> (Self, TickFuture) {
        let (tx, rx) = oneshot::channel();
        let thunk = Self {
            bound,
            action: Action::Resolve(tx),
        };
        (thunk, TickFuture { rx })
    }

    pub fn bound(&self) -> Option<&BoundValue> {
        self.bound.as_ref()
    }

    /// Runs the thunk. A failure is reported to `sink` and swallowed; returns
    /// whether the thunk completed cleanly.
    pub fn run(self, sink: &dyn ErrorSink, tag: &'static str) -> bool {
        let Thunk { bound, action } = self;
        match action {
            Action::Call(callback) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(bound.as_ref())));
                let error = match outcome {
                    Ok(Ok(())) => return true,
                    Ok(Err(err)) => CallbackError::Failed(err),
                    Err(payload) => CallbackError::Panicked(panic_message(&*payload)),
                };
                sink.report(&error, bound.as_ref(), tag);
                false
            }
            Action::Resolve(tx) => {
                // Nobody listening is fine: the caller dropped the future.
                let _ = tx.send(bound);
                true
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Completes after the drain holding its thunk has run.
///
/// Resolves to the bound value (`None` when nothing was bound). Fails with
/// [`DeferError::Canceled`] only if the thunk was dropped unrun, which
/// happens when its execution context is torn down.
#[must_use = "futures do nothing unless polled"]
pub struct TickFuture {
    rx: oneshot::Receiver<Option<BoundValue>>,
}

impl Future for TickFuture {
    type Output = Result<Option<BoundValue>, DeferError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| DeferError::Canceled))
    }
}
