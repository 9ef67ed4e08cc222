//! Router configuration from YAML/JSON.
//!
//! Every field has a default matching the built-in registry, so an empty
//! document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::registry::{builtin_profiles, ProviderProfile, ProviderRegistry, RegistryError};
use crate::scorer::{Scorer, ScoringWeights};
use crate::types::{ProviderId, TaskKind};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid provider registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Time a failed provider stays out of rotation ("60s", "2m", ...)
    #[serde(with = "duration_human")]
    pub cooldown: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Thresholds of the enhanced routing gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Tasks at or above this priority qualify
    pub priority_threshold: u8,

    /// Tasks whose content is longer than this qualify
    pub content_length_threshold: usize,

    /// Task kinds that always qualify
    pub kinds: Vec<TaskKind>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            priority_threshold: 7,
            content_length_threshold: 1000,
            kinds: vec![TaskKind::TextGeneration, TaskKind::Vision],
        }
    }
}

/// Complete router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Provider profiles in routing order
    pub providers: Vec<ProviderProfile>,

    /// Provider of last resort, always appended to the fallback chain
    pub default_provider: ProviderId,

    /// Provider favoured for high-priority tasks
    pub premium_provider: Option<ProviderId>,

    /// Scoring weights
    pub scoring: ScoringWeights,

    /// Circuit breaker settings
    pub health: HealthConfig,

    /// Enhanced routing gate thresholds
    pub gate: GateConfig,

    /// Smoothing factor of the latency moving average
    pub ewma_alpha: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            providers: builtin_profiles(),
            default_provider: ProviderId::fallback(),
            premium_provider: Some(ProviderId::azure_openai()),
            scoring: ScoringWeights::default(),
            health: HealthConfig::default(),
            gate: GateConfig::default(),
            ewma_alpha: 0.1,
        }
    }
}

impl RouterConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the configuration without building anything long-lived.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "ewma_alpha must be within (0.0, 1.0], got {}",
                self.ewma_alpha
            )));
        }
        if self.health.cooldown.is_zero() {
            return Err(ConfigError::ValidationError(
                "health.cooldown must be greater than zero".to_string(),
            ));
        }
        if self.scoring.priority_threshold > crate::types::MAX_PRIORITY {
            return Err(ConfigError::ValidationError(format!(
                "scoring.priority_threshold must be at most {}",
                crate::types::MAX_PRIORITY
            )));
        }
        self.registry()?;
        Ok(())
    }

    /// Build the provider registry described by this configuration.
    pub fn registry(&self) -> Result<ProviderRegistry, ConfigError> {
        Ok(ProviderRegistry::new(
            self.providers.clone(),
            self.default_provider.clone(),
            self.premium_provider.clone(),
        )?)
    }

    /// Build a scorer for `registry` with the configured weights.
    pub fn scorer(&self, registry: &ProviderRegistry) -> Scorer {
        Scorer::for_registry(registry, self.scoring.clone())
    }
}
