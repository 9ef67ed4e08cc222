//! Capability filter.
//!
//! Narrows the registry to the providers that can serve a task right now:
//! healthy, and offering the capability the task kind requires.

use std::collections::BTreeMap;

use crate::registry::{ProviderProfile, ProviderRegistry};
use crate::types::{ProviderId, Task};

/// Read access to provider health.
///
/// Implemented by the runtime health monitor and by plain maps, so the
/// filter stays free of any particular health bookkeeping.
pub trait HealthView {
    /// Whether the provider is currently considered healthy.
    fn is_healthy(&self, provider: &ProviderId) -> bool;
}

/// A health view in which every provider is healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllHealthy;

impl HealthView for AllHealthy {
    fn is_healthy(&self, _provider: &ProviderId) -> bool {
        true
    }
}

impl HealthView for BTreeMap<ProviderId, bool> {
    fn is_healthy(&self, provider: &ProviderId) -> bool {
        self.get(provider).copied().unwrap_or(true)
    }
}

/// Providers able to serve `task`, in registry order.
///
/// The default provider has no external dependency and is always treated
/// as healthy; it is still subject to the capability check.
pub fn eligible_providers<'a, H>(
    registry: &'a ProviderRegistry,
    health: &H,
    task: &Task,
) -> Vec<&'a ProviderProfile>
where
    H: HealthView + ?Sized,
{
    registry
        .iter()
        .filter(|profile| registry.is_default(&profile.name) || health.is_healthy(&profile.name))
        .filter(|profile| profile.can_serve(task))
        .collect()
}
