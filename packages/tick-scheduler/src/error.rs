use crate::bound::BoundValue;
use thiserror::Error;
use tick_host::HostError;

/// Source tag attached to every report of a failed deferred callback.
pub const DEFERRED_CALLBACK_TAG: &str = "deferred-callback";

#[derive(Debug, Error)]
pub enum DeferError {
    #[error("no scheduler is installed on this thread")]
    NotInstalled,

    #[error("execution context `{0}` has been torn down")]
    ContextClosed(String),

    #[error("deferred callback was dropped before it ran")]
    Canceled,

    #[error("invalid scheduler configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// A failure raised by caller-supplied work during a drain.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("deferred callback failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("deferred callback panicked: {0}")]
    Panicked(String),
}

/// Receives callback failures. The drain keeps going after every report.
pub trait ErrorSink {
    fn report(&self, error: &CallbackError, bound: Option<&BoundValue>, tag: &'static str);
}

impl<F> ErrorSink for F
where
    F: Fn(&CallbackError, Option<&BoundValue>, &'static str),
{
    fn report(&self, error: &CallbackError, bound: Option<&BoundValue>, tag: &'static str) {
        self(error, bound, tag)
    }
}

/// The default sink: logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: &CallbackError, bound: Option<&BoundValue>, tag: &'static str) {
        tracing::error!(tag, ?bound, "{error}");
    }
}
