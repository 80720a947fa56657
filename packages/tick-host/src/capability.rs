use serde::{Deserialize, Serialize};

/// An asynchronous-execution primitive a host may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// `Promise.resolve().then(..)`: queues a microtask.
    ResolvedPromise,
    /// Runs after I/O, before timers.
    SetImmediate,
    /// Two entangled ports; posting on one wakes the other.
    MessageChannel,
    /// `setTimeout(f, 0)`. Always present.
    ZeroDelayTimer,
}

/// How a host provides a given primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Absent,
    /// Present, but emulated on top of the timer task source.
    Polyfilled,
    /// Engine implementation advertising the standard native marker.
    Native,
    /// Engine implementation that only reports a vendor constructor tag.
    VendorNative,
}

impl Availability {
    pub fn is_present(self) -> bool {
        !matches!(self, Availability::Absent)
    }
}

/// What a host offers, fixed for the lifetime of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySet {
    pub resolved_promise: Availability,
    pub set_immediate: Availability,
    pub message_channel: Availability,
}

impl CapabilitySet {
    /// Promises and message channels, no `setImmediate`.
    pub fn browser() -> Self {
        Self {
            resolved_promise: Availability::Native,
            set_immediate: Availability::Absent,
            message_channel: Availability::Native,
        }
    }

    pub fn node() -> Self {
        Self {
            resolved_promise: Availability::Native,
            set_immediate: Availability::Native,
            message_channel: Availability::Native,
        }
    }

    /// Old embedded webviews: a promise polyfill and a vendor-tagged channel.
    pub fn legacy_webview() -> Self {
        Self {
            resolved_promise: Availability::Polyfilled,
            set_immediate: Availability::Absent,
            message_channel: Availability::VendorNative,
        }
    }

    /// Timers only.
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn availability(&self, primitive: Primitive) -> Availability {
        match primitive {
            Primitive::ResolvedPromise => self.resolved_promise,
            Primitive::SetImmediate => self.set_immediate,
            Primitive::MessageChannel => self.message_channel,
            Primitive::ZeroDelayTimer => Availability::Native,
        }
    }

    pub fn with(mut self, primitive: Primitive, availability: Availability) -> Self {
        match primitive {
            Primitive::ResolvedPromise => self.resolved_promise = availability,
            Primitive::SetImmediate => self.set_immediate = availability,
            Primitive::MessageChannel => self.message_channel = availability,
            // The timer cannot be removed or downgraded.
            Primitive::ZeroDelayTimer => {}
        }
        self
    }

    pub fn without(self, primitive: Primitive) -> Self {
        self.with(primitive, Availability::Absent)
    }
}
