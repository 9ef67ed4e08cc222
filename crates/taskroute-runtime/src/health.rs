//! Provider health tracking with timed recovery.
//!
//! A failed provider is taken out of rotation and put back after a fixed
//! cooldown. Recovery is purely time based: no probe call is made. Each
//! recovery runs as a spawned timer whose handle is owned by the monitor,
//! so a repeated failure replaces the pending timer and shutdown cancels
//! every timer that has not fired yet.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use taskroute_core::{HealthView, ProviderId};

#[derive(Debug, Default)]
struct HealthEntry {
    healthy: bool,
    marked_down_at: Option<DateTime<Utc>>,
    failures: u64,
    // Bumped on every state change so a stale timer never resets a newer outage.
    generation: u64,
    recovery: Option<JoinHandle<()>>,
}

impl HealthEntry {
    fn up() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    fn cancel_recovery(&mut self) {
        if let Some(handle) = self.recovery.take() {
            handle.abort();
        }
    }
}

/// Point-in-time health of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub down_since: Option<DateTime<Utc>>,
    pub failures: u64,
}

/// Tracks which providers are in rotation.
///
/// The default provider is never taken out of rotation.
pub struct HealthMonitor {
    entries: Arc<RwLock<BTreeMap<ProviderId, HealthEntry>>>,
    default_provider: ProviderId,
    cooldown: Duration,
}

impl HealthMonitor {
    /// Create a monitor with every provider healthy.
    pub fn new(
        providers: impl IntoIterator<Item = ProviderId>,
        default_provider: ProviderId,
        cooldown: Duration,
    ) -> Self {
        let entries = providers
            .into_iter()
            .map(|id| (id, HealthEntry::up()))
            .collect();

        Self {
            entries: Arc::new(RwLock::new(entries)),
            default_provider,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether `provider` is currently in rotation. Unknown providers count as healthy.
    pub fn is_healthy(&self, provider: &ProviderId) -> bool {
        if *provider == self.default_provider {
            return true;
        }
        self.entries
            .read()
            .get(provider)
            .map_or(true, |entry| entry.healthy)
    }

    /// Take `provider` out of rotation and schedule its recovery.
    ///
    /// A provider that is already down has its cooldown restarted. Returns
    /// false when the provider is the default, which is never marked down.
    pub fn mark_unhealthy(&self, provider: &ProviderId) -> bool {
        if *provider == self.default_provider {
            tracing::debug!(
                provider = %provider,
                "Default provider failed, keeping it in rotation"
            );
            return false;
        }

        let mut entries = self.entries.write();
        let entry = entries.entry(provider.clone()).or_insert_with(HealthEntry::up);
        entry.cancel_recovery();
        entry.healthy = false;
        entry.marked_down_at = Some(Utc::now());
        entry.failures += 1;
        entry.generation += 1;

        entry.recovery = self.spawn_recovery(provider.clone(), entry.generation);

        tracing::warn!(
            provider = %provider,
            cooldown = ?self.cooldown,
            failures = entry.failures,
            "Provider marked unhealthy"
        );
        true
    }

    /// Put `provider` back into rotation immediately.
    pub fn mark_healthy(&self, provider: &ProviderId) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(provider) {
            entry.cancel_recovery();
            entry.healthy = true;
            entry.marked_down_at = None;
            entry.generation += 1;
        }
    }

    fn spawn_recovery(&self, provider: ProviderId, generation: u64) -> Option<JoinHandle<()>> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    provider = %provider,
                    "No async runtime, provider stays down until marked healthy"
                );
                return None;
            }
        };

        let entries = Arc::clone(&self.entries);
        let cooldown = self.cooldown;
        Some(runtime.spawn(async move {
            tokio::time::sleep(cooldown).await;

            let mut entries = entries.write();
            if let Some(entry) = entries.get_mut(&provider) {
                if entry.generation == generation {
                    entry.healthy = true;
                    entry.marked_down_at = None;
                    entry.recovery = None;
                    tracing::info!(provider = %provider, "Provider back in rotation");
                }
            }
        }))
    }

    /// Health of every tracked provider.
    pub fn snapshot(&self) -> BTreeMap<ProviderId, ProviderHealth> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    ProviderHealth {
                        healthy: entry.healthy || *id == self.default_provider,
                        down_since: entry.marked_down_at,
                        failures: entry.failures,
                    },
                )
            })
            .collect()
    }

    /// Healthy flag of every tracked provider.
    pub fn status(&self) -> BTreeMap<ProviderId, bool> {
        self.snapshot()
            .into_iter()
            .map(|(id, health)| (id, health.healthy))
            .collect()
    }

    /// Number of recovery timers that have not fired yet.
    pub fn pending_recoveries(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.recovery.as_ref().is_some_and(|h| !h.is_finished()))
            .count()
    }

    /// Cancel every pending recovery timer.
    ///
    /// Providers that are down stay down.
    pub fn shutdown(&self) {
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            entry.cancel_recovery();
        }
    }
}

impl HealthView for HealthMonitor {
    fn is_healthy(&self, provider: &ProviderId) -> bool {
        HealthMonitor::is_healthy(self, provider)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("default_provider", &self.default_provider)
            .field("cooldown", &self.cooldown)
            .field("status", &self.status())
            .finish()
    }
}
