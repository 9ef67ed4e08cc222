//! # taskroute-core
//!
//! Deterministic routing engine for AI inference tasks.
//!
//! This crate answers one question for every task: which provider should
//! execute it? It provides:
//! - The provider registry (capability and performance profiles)
//! - The capability filter (healthy providers able to serve the task)
//! - The scorer (preference, latency, reliability, priority)
//! - Route selection with a deterministic tie-break and a safe default
//! - Router configuration from YAML/JSON
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same registry, health and task always give the same provider
//! 2. **Never fails**: with no eligible provider the default provider is returned
//! 3. **No I/O**: nothing here calls a provider; execution lives in `taskroute-runtime`
//!
//! ## Example
//!
//! ```rust
//! use taskroute_core::{select_provider, AllHealthy, NoopTracer, RouterConfig, Task, TaskKind};
//!
//! let config = RouterConfig::default();
//! let registry = config.registry().unwrap();
//! let scorer = config.scorer(&registry);
//!
//! let task = Task::new(TaskKind::Vision, "describe this image");
//! let decision = select_provider(&registry, &AllHealthy, &scorer, &task, &NoopTracer);
//! assert_eq!(decision.provider.as_str(), "azure_openai");
//! ```

pub mod config;
pub mod filter;
pub mod registry;
pub mod router;
pub mod scorer;
pub mod types;

// Re-export main types at crate root
pub use config::{ConfigError, GateConfig, HealthConfig, RouterConfig};
pub use filter::{eligible_providers, AllHealthy, HealthView};
pub use registry::{builtin_profiles, ProviderProfile, ProviderRegistry, RegistryError};
pub use router::{
    select_provider, LogTracer, NoopTracer, RouteDecision, RouteTracer, ScoredCandidate,
};
pub use scorer::{Scorer, ScoringWeights};
pub use types::{
    Capability, ProviderId, Task, TaskError, TaskKind, DEFAULT_PRIORITY, MAX_PRIORITY,
};
