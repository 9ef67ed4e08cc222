//! Decides which tasks go through enhanced routing.

use taskroute_core::{GateConfig, Task};

use crate::enhanced::EnhancedRouting;

/// Pure predicate over a task and the configured strategy.
#[derive(Debug, Clone, Default)]
pub struct EnhancedGate {
    config: GateConfig,
}

impl EnhancedGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Whether `task` is important, rich or large enough to qualify.
    pub fn qualifies(&self, task: &Task) -> bool {
        task.priority() >= self.config.priority_threshold
            || self.config.kinds.contains(&task.kind())
            || task.content_len() > self.config.content_length_threshold
    }

    /// True when a strategy is present and enabled and `task` qualifies.
    pub fn use_enhanced(&self, strategy: Option<&dyn EnhancedRouting>, task: &Task) -> bool {
        strategy.is_some_and(|s| s.enabled()) && self.qualifies(task)
    }
}
