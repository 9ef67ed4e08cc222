//! Caching of agent routing decisions.
//!
//! Identical tasks (same kind, priority and content) reuse a recent decision
//! instead of paying for another model call.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use taskroute_core::Task;

use super::decision::RoutingDecision;

/// Fingerprint of the task fields that influence a routing decision.
pub fn fingerprint(task: &Task) -> u64 {
    let mut hasher = DefaultHasher::new();
    task.kind().hash(&mut hasher);
    task.priority().hash(&mut hasher);
    task.content().to_string().hash(&mut hasher);
    hasher.finish()
}

/// Decision cache using moka.
pub struct DecisionCache {
    cache: Cache<u64, RoutingDecision>,
}

impl DecisionCache {
    /// Create a new cache with the given configuration.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Get the cached decision for `task`.
    pub async fn get(&self, task: &Task) -> Option<RoutingDecision> {
        self.cache.get(&fingerprint(task)).await
    }

    /// Store the decision made for `task`.
    pub async fn insert(&self, task: &Task, decision: RoutingDecision) {
        self.cache.insert(fingerprint(task), decision).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(300))
    }
}
