use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use tick_host::{Availability, CapabilitySet, EventLoop, Job, MessageChannel, Primitive};

/// Relative priority of a wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    High,
    Low,
}

/// The callback a trigger wakes up. Holds only weak references to its queue.
pub type Flush = Rc<dyn Fn()>;

/// High tier: only a genuine promise microtask qualifies.
pub fn choose_high(caps: &CapabilitySet) -> Option<Primitive> {
    (caps.resolved_promise == Availability::Native).then_some(Primitive::ResolvedPromise)
}

/// Low tier: `setImmediate`, then a message channel, then a zero-delay timer.
/// Polyfills never qualify; the timer always does.
pub fn choose_low(caps: &CapabilitySet) -> Primitive {
    if caps.set_immediate == Availability::Native {
        Primitive::SetImmediate
    } else if matches!(
        caps.message_channel,
        Availability::Native | Availability::VendorNative
    ) {
        Primitive::MessageChannel
    } else {
        Primitive::ZeroDelayTimer
    }
}

enum Wake {
    Microtask,
    Immediate,
    Message(MessageChannel),
    Timer,
}

/// A bound way to request one asynchronous call of a flush.
pub struct Trigger {
    primitive: Primitive,
    host: EventLoop,
    wake: Wake,
    flush: Flush,
}

impl Trigger {
    pub fn bind(primitive: Primitive, host: &EventLoop, flush: Flush) -> Self {
        let wake = match primitive {
            Primitive::ResolvedPromise => Wake::Microtask,
            Primitive::SetImmediate => Wake::Immediate,
            Primitive::ZeroDelayTimer => Wake::Timer,
            Primitive::MessageChannel => match MessageChannel::new(host) {
                Ok(channel) => {
                    let on_message = flush.clone();
                    channel.port1.set_onmessage(move |_| on_message());
                    Wake::Message(channel)
                }
                Err(err) => {
                    tracing::warn!(%err, "message channel unavailable, binding a timer instead");
                    return Self::bind(Primitive::ZeroDelayTimer, host, flush);
                }
            },
        };

        Self {
            primitive,
            host: host.clone(),
            wake,
            flush,
        }
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Requests one call of the flush on a later turn.
    ///
    /// A trigger bound to a primitive its host lacks wakes through a
    /// zero-delay timer instead.
    pub fn fire(&self) {
        let fired = match &self.wake {
            Wake::Microtask => self.host.queue_microtask(self.job()),
            Wake::Immediate => self.host.set_immediate(self.job()),
            Wake::Message(channel) => channel.port2.post_message(serde_json::json!(1)),
            Wake::Timer => {
                self.fire_timer();
                Ok(())
            }
        };

        if let Err(err) = fired {
            tracing::warn!(primitive = ?self.primitive, %err, "trigger refused to fire, using a zero-delay timer");
            self.fire_timer();
        }
    }

    fn fire_timer(&self) {
        self.host.set_timeout(0, self.job());
    }

    fn job(&self) -> Job {
        let flush = self.flush.clone();
        Box::new(move || flush())
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("primitive", &self.primitive)
            .finish_non_exhaustive()
    }
}

/// One trigger per tier. Without a native promise both tiers share the low
/// trigger.
#[derive(Debug, Clone)]
pub struct TriggerPair {
    pub high: Rc<Trigger>,
    pub low: Rc<Trigger>,
}

impl TriggerPair {
    pub fn get(&self, tier: Tier) -> &Trigger {
        match tier {
            Tier::High => &self.high,
            Tier::Low => &self.low,
        }
    }

    pub fn shares_trigger(&self) -> bool {
        Rc::ptr_eq(&self.high, &self.low)
    }
}

pub fn select_low(caps: &CapabilitySet, host: &EventLoop, flush: Flush) -> Trigger {
    Trigger::bind(choose_low(caps), host, flush)
}

pub fn select(caps: &CapabilitySet, host: &EventLoop, flush: Flush) -> TriggerPair {
    let low = Rc::new(select_low(caps, host, flush.clone()));
    let high = match choose_high(caps) {
        Some(primitive) => Rc::new(Trigger::bind(primitive, host, flush)),
        None => low.clone(),
    };

    tracing::info!(
        high = ?high.primitive(),
        low = ?low.primitive(),
        "selected deferred-callback triggers"
    );
    TriggerPair { high, low }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_prefers_promise_then_channel() {
        let caps = CapabilitySet::browser();
        assert_eq!(choose_high(&caps), Some(Primitive::ResolvedPromise));
        assert_eq!(choose_low(&caps), Primitive::MessageChannel);
    }

    #[test]
    fn test_node_prefers_immediate() {
        assert_eq!(choose_low(&CapabilitySet::node()), Primitive::SetImmediate);
    }

    #[test]
    fn test_polyfills_are_rejected() {
        let caps = CapabilitySet::bare()
            .with(Primitive::ResolvedPromise, Availability::Polyfilled)
            .with(Primitive::SetImmediate, Availability::Polyfilled)
            .with(Primitive::MessageChannel, Availability::Polyfilled);
        assert_eq!(choose_high(&caps), None);
        assert_eq!(choose_low(&caps), Primitive::ZeroDelayTimer);
    }

    #[test]
    fn test_vendor_tagged_channel_is_accepted() {
        let caps = CapabilitySet::legacy_webview();
        assert_eq!(choose_high(&caps), None);
        assert_eq!(choose_low(&caps), Primitive::MessageChannel);
    }

    #[test]
    fn test_vendor_tag_only_counts_for_channels() {
        let caps = CapabilitySet::bare()
            .with(Primitive::ResolvedPromise, Availability::VendorNative)
            .with(Primitive::SetImmediate, Availability::VendorNative);
        assert_eq!(choose_high(&caps), None);
        assert_eq!(choose_low(&caps), Primitive::ZeroDelayTimer);
    }

    #[test]
    fn test_high_falls_back_to_low_trigger() {
        let host = EventLoop::new(CapabilitySet::bare());
        let pair = select(&host.probe(), &host, Rc::new(|| {}));
        assert!(pair.shares_trigger());
        assert_eq!(pair.get(Tier::High).primitive(), Primitive::ZeroDelayTimer);
    }

    #[test]
    fn test_fire_falls_back_to_timer_when_host_lacks_primitive() {
        // Capabilities claim primitives this host does not have.
        let host = EventLoop::new(CapabilitySet::bare());
        let flushed = Rc::new(std::cell::Cell::new(0));
        let flush: Flush = {
            let flushed = flushed.clone();
            Rc::new(move || flushed.set(flushed.get() + 1))
        };
        let pair = select(&CapabilitySet::node(), &host, flush);
        assert_eq!(pair.high.primitive(), Primitive::ResolvedPromise);
        assert_eq!(pair.low.primitive(), Primitive::SetImmediate);

        pair.high.fire();
        pair.low.fire();
        let stats = host.stats();
        assert_eq!(stats.microtasks_queued, 0);
        assert_eq!(stats.immediates_queued, 0);
        assert_eq!(stats.timers_set, 2);

        host.run_until_idle();
        assert_eq!(flushed.get(), 2);
    }

    #[test]
    fn test_bind_without_host_channel_uses_timer() {
        // Capabilities claim a channel the host cannot build.
        let host = EventLoop::new(CapabilitySet::bare());
        let trigger = select_low(&CapabilitySet::browser(), &host, Rc::new(|| {}));
        assert_eq!(trigger.primitive(), Primitive::ZeroDelayTimer);
    }
}
