pub mod capability;
pub mod channel;
pub mod context;
pub mod error;
pub mod event_loop;
pub mod queue;

pub use capability::{Availability, CapabilitySet, Primitive};
pub use channel::{MessageChannel, MessagePort, PortId};
pub use context::ExecutionContext;
pub use error::HostError;
pub use event_loop::{EventLoop, HostStats, TaskSource, TimerId};
pub use queue::{Job, TaskQueue};
