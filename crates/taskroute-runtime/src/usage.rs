//! Per-provider request accounting.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

use taskroute_core::ProviderId;

/// Counters of one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    /// Attempts made, successful or not
    pub requests: u64,
    pub tokens: u64,
    pub errors: u64,
}

impl ProviderUsage {
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

/// Usage counters for every provider, initialised at zero.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<BTreeMap<ProviderId, ProviderUsage>>,
}

impl UsageTracker {
    pub fn new(providers: impl IntoIterator<Item = ProviderId>) -> Self {
        let usage = providers
            .into_iter()
            .map(|id| (id, ProviderUsage::default()))
            .collect();
        Self {
            usage: RwLock::new(usage),
        }
    }

    pub fn record_success(&self, provider: &ProviderId, tokens: u64) {
        let mut usage = self.usage.write();
        let entry = usage.entry(provider.clone()).or_default();
        entry.requests += 1;
        entry.tokens += tokens;
    }

    pub fn record_failure(&self, provider: &ProviderId) {
        let mut usage = self.usage.write();
        let entry = usage.entry(provider.clone()).or_default();
        entry.requests += 1;
        entry.errors += 1;
    }

    pub fn get(&self, provider: &ProviderId) -> ProviderUsage {
        self.usage.read().get(provider).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<ProviderId, ProviderUsage> {
        self.usage.read().clone()
    }

    pub fn total_requests(&self) -> u64 {
        self.usage.read().values().map(|u| u.requests).sum()
    }

    /// Zero every counter, keeping the provider set.
    pub fn reset(&self) {
        for entry in self.usage.write().values_mut() {
            *entry = ProviderUsage::default();
        }
    }
}
