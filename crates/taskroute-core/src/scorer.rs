//! Provider scoring.
//!
//! The score is a sum of four terms, always added in the same order so the
//! floating point result is reproducible:
//! 1. preference (primary providers over the degraded default)
//! 2. performance (inverse of measured latency)
//! 3. reliability (success rate)
//! 4. priority bonus (premium provider, high-priority tasks)
//!
//! The weights are a heuristic. They are configurable and nothing else in the
//! crate depends on their particular values.

use serde::{Deserialize, Serialize};

use crate::registry::{ProviderProfile, ProviderRegistry};
use crate::types::{ProviderId, Task};

/// Weights of the scoring terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Preference term for any provider other than the default
    pub primary_preference: f64,

    /// Preference term for the default provider
    pub default_preference: f64,

    /// Numerator of the latency term (`numerator / avg_ms`)
    pub latency_numerator: f64,

    /// Multiplier of the latency term
    pub latency_weight: f64,

    /// Multiplier of the success rate
    pub reliability_weight: f64,

    /// Bonus for the premium provider on high-priority tasks
    pub priority_bonus: f64,

    /// Minimum task priority that earns the bonus
    pub priority_threshold: u8,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            primary_preference: 30.0,
            default_preference: 5.0,
            latency_numerator: 1000.0,
            latency_weight: 10.0,
            reliability_weight: 20.0,
            priority_bonus: 20.0,
            priority_threshold: 8,
        }
    }
}

/// Pure scoring function over provider profiles.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
    default_provider: ProviderId,
    premium_provider: Option<ProviderId>,
}

impl Scorer {
    pub fn new(
        weights: ScoringWeights,
        default_provider: ProviderId,
        premium_provider: Option<ProviderId>,
    ) -> Self {
        Self {
            weights,
            default_provider,
            premium_provider,
        }
    }

    /// Scorer using the roles designated by `registry`.
    pub fn for_registry(registry: &ProviderRegistry, weights: ScoringWeights) -> Self {
        Self::new(
            weights,
            registry.default_provider().clone(),
            registry.premium_provider().cloned(),
        )
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a provider for a task. Higher is better.
    pub fn score(&self, profile: &ProviderProfile, task: &Task) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        score += if profile.name == self.default_provider {
            w.default_preference
        } else {
            w.primary_preference
        };

        score += (w.latency_numerator / profile.avg_response_time_ms) * w.latency_weight;

        score += profile.success_rate * w.reliability_weight;

        if task.priority() >= w.priority_threshold
            && self.premium_provider.as_ref() == Some(&profile.name)
        {
            score += w.priority_bonus;
        }

        score
    }
}
