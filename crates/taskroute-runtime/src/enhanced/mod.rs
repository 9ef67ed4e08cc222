//! Optional enhanced routing.
//!
//! An [`EnhancedRouting`] strategy may take over execution of qualifying
//! tasks. It holds a weak back-reference to the router it is plugged into
//! ([`BaseRouter`]) so it can consult the base route, provider profiles and
//! health without keeping the router alive.

mod agent;
mod cache;
mod decision;

pub use agent::{
    AgentRoutingConfig, AgentRoutingStrategy, PerformanceEntry, RoutingInsights, RoutingRecord,
};
pub use cache::DecisionCache;
pub use decision::{
    analyze_complexity, estimate_tokens, parse_decision, DecisionParseError, RoutingDecision,
    TaskComplexity,
};

use async_trait::async_trait;
use std::sync::Weak;
use thiserror::Error;

use taskroute_core::{ProviderId, ProviderProfile, Task};

use crate::executor::{TaskExecutor, TaskOutput};
use crate::providers::ProviderError;

/// Errors from an enhanced routing strategy.
#[derive(Error, Debug)]
pub enum EnhancedRoutingError {
    #[error("Enhanced routing is disabled")]
    Disabled,

    #[error("Base router is no longer available")]
    RouterUnavailable,

    #[error("No provider in the routing decision")]
    NoProviders,

    #[error("Provider {provider} failed: {source}")]
    Execution {
        provider: ProviderId,
        #[source]
        source: ProviderError,
    },
}

/// Read-only view of the router an enhanced strategy is attached to.
pub trait BaseRouter: Send + Sync {
    /// Basic route for `task`.
    fn route(&self, task: &Task) -> ProviderId;

    /// Snapshot of every provider profile in registry order.
    fn providers(&self) -> Vec<ProviderProfile>;

    fn is_healthy(&self, provider: &ProviderId) -> bool;

    fn default_provider(&self) -> ProviderId;

    fn premium_provider(&self) -> Option<ProviderId>;
}

/// Pluggable strategy that can execute qualifying tasks itself.
#[async_trait]
pub trait EnhancedRouting: Send + Sync {
    /// Whether the strategy is ready to take tasks.
    fn enabled(&self) -> bool;

    /// Called once when the strategy is attached to a router.
    fn set_base_router(&self, router: Weak<dyn BaseRouter>);

    /// Execute `task` through `executor` using the strategy's own routing.
    async fn execute_with_enhanced_routing(
        &self,
        task: &Task,
        executor: &dyn TaskExecutor,
    ) -> Result<TaskOutput, EnhancedRoutingError>;

    /// Strategy-specific advice for the usage report.
    fn recommendations(&self) -> Vec<String> {
        Vec::new()
    }
}
