//! Provider registry: capability and performance profiles.
//!
//! The registry is a static table built once at startup. Declaration order
//! matters: it is the iteration order of the capability filter and therefore
//! the tie-break order of route selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::types::{Capability, ProviderId, Task};

/// Lowest latency average a profile can hold, in milliseconds.
pub const MIN_AVG_RESPONSE_TIME_MS: f64 = 0.1;

/// Errors from building a registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Provider '{0}' is registered more than once")]
    DuplicateProvider(ProviderId),

    #[error("Default provider '{0}' is not registered")]
    MissingDefault(ProviderId),

    #[error("Premium provider '{0}' is not registered")]
    UnknownPremium(ProviderId),

    #[error("Invalid profile for '{provider}': {reason}")]
    InvalidProfile { provider: ProviderId, reason: String },
}

fn default_success_rate() -> f64 {
    0.95
}

/// Capability and performance profile of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider identifier
    pub name: ProviderId,

    /// Largest request the provider accepts
    pub max_tokens_per_request: u32,

    #[serde(default)]
    pub supports_streaming: bool,

    #[serde(default)]
    pub supports_vision: bool,

    #[serde(default)]
    pub supports_embeddings: bool,

    /// Moving average of observed latency (mutated after every success)
    pub avg_response_time_ms: f64,

    /// Expected success rate (0.0 - 1.0)
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    /// Price per thousand tokens, used for cost estimates
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

impl ProviderProfile {
    /// Create a profile with no optional capabilities.
    pub fn new(name: impl Into<ProviderId>, max_tokens_per_request: u32) -> Self {
        Self {
            name: name.into(),
            max_tokens_per_request,
            supports_streaming: false,
            supports_vision: false,
            supports_embeddings: false,
            avg_response_time_ms: 1000.0,
            success_rate: default_success_rate(),
            cost_per_1k_tokens: 0.0,
        }
    }

    pub fn with_streaming(mut self, supported: bool) -> Self {
        self.supports_streaming = supported;
        self
    }

    pub fn with_vision(mut self, supported: bool) -> Self {
        self.supports_vision = supported;
        self
    }

    pub fn with_embeddings(mut self, supported: bool) -> Self {
        self.supports_embeddings = supported;
        self
    }

    pub fn with_latency_ms(mut self, avg_response_time_ms: f64) -> Self {
        self.avg_response_time_ms = avg_response_time_ms;
        self
    }

    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate;
        self
    }

    pub fn with_cost_per_1k_tokens(mut self, cost: f64) -> Self {
        self.cost_per_1k_tokens = cost;
        self
    }

    /// Whether the provider offers a capability.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Vision => self.supports_vision,
            Capability::Embeddings => self.supports_embeddings,
            Capability::Streaming => self.supports_streaming,
        }
    }

    /// Whether the provider offers whatever the task kind requires.
    pub fn can_serve(&self, task: &Task) -> bool {
        task.kind()
            .required_capability()
            .map_or(true, |capability| self.supports(capability))
    }

    /// Fold an observed latency into the moving average.
    ///
    /// `new = old * (1 - alpha) + elapsed_ms * alpha`, never below
    /// [`MIN_AVG_RESPONSE_TIME_MS`]. Returns the new average.
    pub fn record_latency(&mut self, elapsed_ms: f64, alpha: f64) -> f64 {
        let updated = self.avg_response_time_ms * (1.0 - alpha) + elapsed_ms * alpha;
        self.avg_response_time_ms = updated.max(MIN_AVG_RESPONSE_TIME_MS);
        self.avg_response_time_ms
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidProfile {
            provider: self.name.clone(),
            reason: reason.to_string(),
        };

        if !(self.avg_response_time_ms.is_finite() && self.avg_response_time_ms > 0.0) {
            return Err(invalid("avg_response_time_ms must be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(invalid("success_rate must be within 0.0..=1.0"));
        }
        if self.cost_per_1k_tokens < 0.0 {
            return Err(invalid("cost_per_1k_tokens must not be negative"));
        }
        Ok(())
    }
}

/// The built-in provider table.
pub fn builtin_profiles() -> Vec<ProviderProfile> {
    vec![
        ProviderProfile::new(ProviderId::azure_openai(), 8192)
            .with_streaming(true)
            .with_vision(true)
            .with_embeddings(true)
            .with_latency_ms(500.0)
            .with_cost_per_1k_tokens(0.03),
        ProviderProfile::new(ProviderId::fallback(), 1000).with_latency_ms(10.0),
    ]
}

/// Ordered table of provider profiles with designated roles.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    profiles: Vec<ProviderProfile>,
    default_provider: ProviderId,
    premium_provider: Option<ProviderId>,
}

impl ProviderRegistry {
    /// Build a registry.
    ///
    /// The default provider must be present; it is the provider of last
    /// resort for every task. The premium provider, if any, receives the
    /// high-priority scoring bonus.
    pub fn new(
        profiles: Vec<ProviderProfile>,
        default_provider: ProviderId,
        premium_provider: Option<ProviderId>,
    ) -> Result<Self, RegistryError> {
        let mut seen = BTreeSet::new();
        for profile in &profiles {
            if !seen.insert(profile.name.clone()) {
                return Err(RegistryError::DuplicateProvider(profile.name.clone()));
            }
            profile.validate()?;
        }

        if !seen.contains(&default_provider) {
            return Err(RegistryError::MissingDefault(default_provider));
        }
        if let Some(premium) = &premium_provider {
            if !seen.contains(premium) {
                return Err(RegistryError::UnknownPremium(premium.clone()));
            }
        }

        let registry = Self {
            profiles,
            default_provider,
            premium_provider,
        };
        if let Some(default) = registry.get(&registry.default_provider) {
            if default.supports_streaming && default.supports_vision && default.supports_embeddings
            {
                tracing::warn!(
                    provider = %default.name,
                    "Default provider advertises every capability; it is still scored as degraded"
                );
            }
        }
        Ok(registry)
    }

    /// The built-in two-provider registry.
    pub fn builtin() -> Self {
        Self {
            profiles: builtin_profiles(),
            default_provider: ProviderId::fallback(),
            premium_provider: Some(ProviderId::azure_openai()),
        }
    }

    /// Profiles in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderProfile> {
        self.profiles.iter()
    }

    pub fn profiles(&self) -> &[ProviderProfile] {
        &self.profiles
    }

    pub fn get(&self, provider: &ProviderId) -> Option<&ProviderProfile> {
        self.profiles.iter().find(|p| &p.name == provider)
    }

    pub fn get_mut(&mut self, provider: &ProviderId) -> Option<&mut ProviderProfile> {
        self.profiles.iter_mut().find(|p| &p.name == provider)
    }

    pub fn contains(&self, provider: &ProviderId) -> bool {
        self.get(provider).is_some()
    }

    /// Provider identifiers in declaration order.
    pub fn ids(&self) -> Vec<ProviderId> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    pub fn default_provider(&self) -> &ProviderId {
        &self.default_provider
    }

    pub fn premium_provider(&self) -> Option<&ProviderId> {
        self.premium_provider.as_ref()
    }

    pub fn is_default(&self, provider: &ProviderId) -> bool {
        &self.default_provider == provider
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
