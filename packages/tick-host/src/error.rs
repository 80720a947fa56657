use crate::capability::Primitive;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host does not provide {0:?}")]
    Unsupported(Primitive),

    #[error("message port is closed")]
    PortClosed,

    #[error("execution context `{0}` has been closed")]
    ContextClosed(String),
}
