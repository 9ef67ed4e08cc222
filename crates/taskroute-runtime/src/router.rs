//! The task router: registry, health, usage and the optional enhanced strategy.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

use taskroute_core::{
    select_provider, ConfigError, LogTracer, ProviderId, ProviderProfile, ProviderRegistry,
    RouteDecision, RouteTracer, RouterConfig, Scorer, Task,
};

use crate::enhanced::{BaseRouter, EnhancedRouting};
use crate::gate::EnhancedGate;
use crate::health::HealthMonitor;
use crate::usage::UsageTracker;

/// Routes tasks to providers and executes them with fallback.
///
/// Built once by [`TaskRouterBuilder`] and shared behind an `Arc`.
/// Dropping the router cancels every pending recovery timer.
pub struct TaskRouter {
    registry: RwLock<ProviderRegistry>,
    scorer: Scorer,
    health: HealthMonitor,
    gate: EnhancedGate,
    usage: UsageTracker,
    enhanced: Option<Arc<dyn EnhancedRouting>>,
    tracer: Arc<dyn RouteTracer>,
    config: RouterConfig,
}

impl TaskRouter {
    /// Router over `config` without enhanced routing.
    pub fn new(config: RouterConfig) -> Result<Arc<Self>, ConfigError> {
        TaskRouterBuilder::new().config(config).build()
    }

    pub fn builder() -> TaskRouterBuilder {
        TaskRouterBuilder::new()
    }

    /// Best provider for `task`. Never fails.
    pub fn route(&self, task: &Task) -> ProviderId {
        self.route_decision(task).provider
    }

    /// Full decision for `task`, traced with the configured tracer.
    pub fn route_decision(&self, task: &Task) -> RouteDecision {
        self.route_traced(task, self.tracer.as_ref())
    }

    /// Full decision for `task`, traced with `tracer`.
    pub fn route_traced(&self, task: &Task, tracer: &dyn RouteTracer) -> RouteDecision {
        let registry = self.registry.read();
        select_provider(&registry, &self.health, &self.scorer, task, tracer)
    }

    pub fn is_healthy(&self, provider: &ProviderId) -> bool {
        self.health.is_healthy(provider)
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn gate(&self) -> &EnhancedGate {
        &self.gate
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn enhanced(&self) -> Option<&Arc<dyn EnhancedRouting>> {
        self.enhanced.as_ref()
    }

    /// Current profile of `provider`, including its measured latency.
    pub fn profile(&self, provider: &ProviderId) -> Option<ProviderProfile> {
        self.registry.read().get(provider).cloned()
    }

    /// Current profiles in registry order.
    pub fn profiles(&self) -> Vec<ProviderProfile> {
        self.registry.read().profiles().to_vec()
    }

    pub fn default_provider(&self) -> ProviderId {
        self.registry.read().default_provider().clone()
    }

    pub fn premium_provider(&self) -> Option<ProviderId> {
        self.registry.read().premium_provider().cloned()
    }

    /// Strategy to use for `task`, if the gate lets it through.
    pub(crate) fn enhanced_for(&self, task: &Task) -> Option<Arc<dyn EnhancedRouting>> {
        let strategy = self.enhanced.as_deref();
        if self.gate.use_enhanced(strategy, task) {
            self.enhanced.clone()
        } else {
            None
        }
    }

    pub(crate) fn record_success(&self, provider: &ProviderId, elapsed_ms: f64, tokens: u64) {
        let avg = self
            .registry
            .write()
            .get_mut(provider)
            .map(|profile| profile.record_latency(elapsed_ms, self.config.ewma_alpha));
        self.usage.record_success(provider, tokens);
        tracing::debug!(
            provider = %provider,
            elapsed_ms,
            avg_response_time_ms = ?avg,
            "Provider attempt succeeded"
        );
    }

    pub(crate) fn record_failure(&self, provider: &ProviderId) {
        self.health.mark_unhealthy(provider);
        self.usage.record_failure(provider);
    }

    /// Cancel pending recovery timers. Providers that are down stay down.
    pub fn shutdown(&self) {
        self.health.shutdown();
    }
}

impl BaseRouter for TaskRouter {
    fn route(&self, task: &Task) -> ProviderId {
        TaskRouter::route(self, task)
    }

    fn providers(&self) -> Vec<ProviderProfile> {
        self.profiles()
    }

    fn is_healthy(&self, provider: &ProviderId) -> bool {
        TaskRouter::is_healthy(self, provider)
    }

    fn default_provider(&self) -> ProviderId {
        TaskRouter::default_provider(self)
    }

    fn premium_provider(&self) -> Option<ProviderId> {
        TaskRouter::premium_provider(self)
    }
}

impl std::fmt::Debug for TaskRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRouter")
            .field("providers", &self.registry.read().ids())
            .field("health", &self.health)
            .field("enhanced", &self.enhanced.is_some())
            .finish()
    }
}

/// Builder for TaskRouter.
pub struct TaskRouterBuilder {
    config: RouterConfig,
    enhanced: Option<Arc<dyn EnhancedRouting>>,
    tracer: Arc<dyn RouteTracer>,
}

impl TaskRouterBuilder {
    /// Create a new builder with the built-in configuration.
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            enhanced: None,
            tracer: Arc::new(LogTracer),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an enhanced routing strategy.
    pub fn enhanced(mut self, strategy: Arc<dyn EnhancedRouting>) -> Self {
        self.enhanced = Some(strategy);
        self
    }

    /// Set the tracer used by [`TaskRouter::route`].
    pub fn tracer(mut self, tracer: Arc<dyn RouteTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Build the router and hand the strategy a weak handle to it.
    pub fn build(self) -> Result<Arc<TaskRouter>, ConfigError> {
        self.config.validate()?;
        let registry = self.config.registry()?;
        let scorer = self.config.scorer(&registry);
        let health = HealthMonitor::new(
            registry.ids(),
            registry.default_provider().clone(),
            self.config.health.cooldown,
        );
        let usage = UsageTracker::new(registry.ids());
        let gate = EnhancedGate::new(self.config.gate.clone());

        tracing::info!(
            providers = registry.len(),
            default = %registry.default_provider(),
            enhanced = self.enhanced.is_some(),
            "Task router ready"
        );

        let enhanced = self.enhanced;
        let tracer = self.tracer;
        let config = self.config;

        Ok(Arc::new_cyclic(|weak: &Weak<TaskRouter>| {
            if let Some(strategy) = &enhanced {
                let base: Weak<dyn BaseRouter> = weak.clone();
                strategy.set_base_router(base);
            }
            TaskRouter {
                registry: RwLock::new(registry),
                scorer,
                health,
                gate,
                usage,
                enhanced,
                tracer,
                config,
            }
        }))
    }
}

impl Default for TaskRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskroute_core::{NoopTracer, TaskKind};

    #[test]
    fn test_builtin_routes() {
        let router = TaskRouter::new(RouterConfig::default()).unwrap();

        assert_eq!(router.route(&Task::new(TaskKind::Vision, "img")), ProviderId::azure_openai());
        // The 10ms default wins plain text under the default weights.
        assert_eq!(
            router.route(&Task::new(TaskKind::TextGeneration, "hi")),
            ProviderId::fallback()
        );
        assert_eq!(router.default_provider(), ProviderId::fallback());
        assert_eq!(router.premium_provider(), Some(ProviderId::azure_openai()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RouterConfig {
            ewma_alpha: 2.0,
            ..RouterConfig::default()
        };
        assert!(matches!(
            TaskRouter::new(config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_route_traced_matches_route() {
        let router = TaskRouter::builder()
            .tracer(Arc::new(NoopTracer))
            .build()
            .unwrap();
        let task = Task::new(TaskKind::Streaming, "chunks");

        let decision = router.route_traced(&task, &LogTracer);
        assert_eq!(decision.provider, router.route(&task));
        assert!(!decision.degraded);
    }

    #[test]
    fn test_base_router_view() {
        let router = TaskRouter::new(RouterConfig::default()).unwrap();
        let base: Arc<dyn BaseRouter> = router.clone();

        assert_eq!(base.providers().len(), 2);
        assert!(base.is_healthy(&ProviderId::azure_openai()));
        assert_eq!(base.default_provider(), ProviderId::fallback());
    }
}
