use crate::error::DeferError;
use crate::selector::Tier;
use serde::{Deserialize, Serialize};
use tick_host::{CapabilitySet, Primitive};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tier armed by registrations made outside any low-priority scope.
    pub initial_tier: Tier,
    /// Primitives to ignore even when the host offers them.
    pub disabled_primitives: Vec<Primitive>,
    /// Drains larger than this log a warning.
    pub slow_batch_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_tier: Tier::High,
            disabled_primitives: Vec::new(),
            slow_batch_threshold: 1024,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> Result<Self, DeferError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The probed capabilities with disabled primitives masked out.
    pub fn mask(&self, caps: CapabilitySet) -> CapabilitySet {
        self.disabled_primitives
            .iter()
            .fold(caps, |caps, &primitive| caps.without(primitive))
    }
}
