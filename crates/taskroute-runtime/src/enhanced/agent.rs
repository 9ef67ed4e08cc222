//! Model-assisted routing.
//!
//! The agent strategy asks a chat model where a task should run, then
//! executes it on that provider with the default provider as fallback. It
//! never blocks a task: a model failure or an unusable reply degrades to the
//! base router's choice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

use taskroute_core::{ProviderId, ProviderProfile, Task, TaskKind};

use super::cache::DecisionCache;
use super::decision::{
    analyze_complexity, estimate_tokens, parse_decision, RoutingDecision, TaskComplexity,
};
use super::{BaseRouter, EnhancedRouting, EnhancedRoutingError};
use crate::executor::{dedupe_chain, TaskExecutor, TaskOutput};
use crate::prompts::{build_routing_prompt, provider_description, ROUTING_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};

/// Window of recent decisions used for recommendations.
const RECENT_WINDOW: usize = 100;

/// Decisions returned by [`AgentRoutingStrategy::insights`].
const RECENT_DECISIONS: usize = 10;

/// Agent strategy settings.
#[derive(Debug, Clone)]
pub struct AgentRoutingConfig {
    /// Master switch; the strategy also needs a model to be enabled
    pub enabled: bool,

    /// Settings of the routing model call
    pub completion: CompletionConfig,

    /// Provider used when the base router is gone
    pub default_provider: ProviderId,

    pub cache_capacity: u64,

    pub cache_ttl: Duration,

    /// Most recent decisions kept for insights
    pub history_limit: usize,
}

impl Default for AgentRoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            completion: CompletionConfig::default(),
            default_provider: ProviderId::fallback(),
            cache_capacity: 1_000,
            cache_ttl: Duration::from_secs(300),
            history_limit: 1_000,
        }
    }
}

/// One routing decision as kept in the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingRecord {
    pub timestamp: DateTime<Utc>,
    pub task_kind: TaskKind,
    pub priority: u8,
    pub content_size: usize,
    pub provider: ProviderId,
    pub complexity: TaskComplexity,
    pub confidence: f64,
    pub reasoning: String,
}

/// Aggregate view of the routing history.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingInsights {
    pub total_routings: usize,
    pub provider_distribution: BTreeMap<ProviderId, usize>,
    pub complexity_distribution: BTreeMap<TaskComplexity, usize>,
    pub average_confidence: f64,
    pub recent_decisions: Vec<RoutingRecord>,
    pub recommendations: Vec<String>,
}

/// Outcomes of one provider on tasks of one complexity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceEntry {
    pub provider: ProviderId,
    pub complexity: TaskComplexity,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    /// Mean over successful attempts
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, Default)]
struct Metrics {
    successes: u64,
    failures: u64,
    total_response_ms: f64,
}

impl Metrics {
    fn total(&self) -> u64 {
        self.successes + self.failures
    }

    fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.successes as f64 / self.total() as f64
        }
    }
}

/// What the strategy knows about the base router for one decision.
struct BaseView {
    providers: Vec<ProviderProfile>,
    health: BTreeMap<ProviderId, bool>,
    base_choice: ProviderId,
    default_provider: ProviderId,
}

/// Enhanced routing backed by a chat model.
pub struct AgentRoutingStrategy {
    llm: Option<Arc<dyn LlmProvider>>,
    config: AgentRoutingConfig,
    base: RwLock<Option<Weak<dyn BaseRouter>>>,
    cache: DecisionCache,
    history: RwLock<VecDeque<RoutingRecord>>,
    metrics: RwLock<BTreeMap<(ProviderId, TaskComplexity), Metrics>>,
}

impl AgentRoutingStrategy {
    pub fn new(llm: Arc<dyn LlmProvider>, config: AgentRoutingConfig) -> Self {
        Self::build(Some(llm), config)
    }

    /// A strategy without a model. It reports itself disabled and only
    /// produces base-router decisions.
    pub fn without_model(config: AgentRoutingConfig) -> Self {
        Self::build(None, config)
    }

    fn build(llm: Option<Arc<dyn LlmProvider>>, config: AgentRoutingConfig) -> Self {
        let cache = DecisionCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            llm,
            config,
            base: RwLock::new(None),
            cache,
            history: RwLock::new(VecDeque::new()),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &AgentRoutingConfig {
        &self.config
    }

    fn base(&self) -> Option<Arc<dyn BaseRouter>> {
        self.base.read().as_ref().and_then(Weak::upgrade)
    }

    fn base_view(&self, task: &Task) -> BaseView {
        match self.base() {
            Some(base) => {
                let providers = base.providers();
                let health = providers
                    .iter()
                    .map(|p| (p.name.clone(), base.is_healthy(&p.name)))
                    .collect();
                BaseView {
                    providers,
                    health,
                    base_choice: base.route(task),
                    default_provider: base.default_provider(),
                }
            }
            None => BaseView {
                providers: Vec::new(),
                health: BTreeMap::new(),
                base_choice: self.config.default_provider.clone(),
                default_provider: self.config.default_provider.clone(),
            },
        }
    }

    fn base_decision(
        &self,
        task: &Task,
        view: &BaseView,
        reasoning: impl Into<String>,
        confidence: f64,
        notes: Vec<String>,
    ) -> RoutingDecision {
        RoutingDecision {
            provider: view.base_choice.clone(),
            complexity: analyze_complexity(task),
            reasoning: reasoning.into(),
            confidence,
            estimated_tokens: estimate_tokens(task),
            recommended_model: None,
            fallback_options: vec![view.default_provider.clone()],
            optimization_notes: notes,
        }
    }

    /// Decide where `task` should run.
    ///
    /// Decisions are cached per task fingerprint and every decision,
    /// cached or not, is added to the history.
    pub async fn route_task_enhanced(&self, task: &Task) -> RoutingDecision {
        let view = self.base_view(task);

        let llm = match (&self.llm, self.config.enabled) {
            (Some(llm), true) => llm,
            _ => {
                let decision = self.base_decision(
                    task,
                    &view,
                    "Using base router (enhanced routing not available)",
                    0.7,
                    Vec::new(),
                );
                self.record(task, &decision);
                return decision;
            }
        };

        if let Some(decision) = self.cache.get(task).await {
            tracing::debug!(provider = %decision.provider, "Using cached routing decision");
            self.record(task, &decision);
            return decision;
        }

        let providers = provider_description(&view.providers, |p| {
            view.health.get(&p.name).copied().unwrap_or(true)
        });
        let messages = vec![
            ChatMessage::system(ROUTING_SYSTEM_PROMPT),
            ChatMessage::user(build_routing_prompt(task, &providers)),
        ];

        let decision = match llm.complete(messages, &self.config.completion).await {
            Ok(response) => {
                tracing::debug!(
                    llm = llm.name(),
                    model = %response.model,
                    tokens = response.usage.total(),
                    "Routing model replied"
                );
                let known: Vec<ProviderId> =
                    view.providers.iter().map(|p| p.name.clone()).collect();
                match parse_decision(
                    &response.content,
                    task,
                    &known,
                    &view.base_choice,
                    &view.default_provider,
                ) {
                    Ok(decision) => {
                        self.cache.insert(task, decision.clone()).await;
                        decision
                    }
                    Err(e) => {
                        tracing::warn!(
                            llm = llm.name(),
                            error = %e,
                            "Failed to parse agent decision"
                        );
                        self.base_decision(
                            task,
                            &view,
                            "Failed to parse agent decision, using base router",
                            0.5,
                            vec!["agent decision parsing failed".to_string()],
                        )
                    }
                }
            }
            Err(e) => {
                tracing::error!(llm = llm.name(), error = %e, "Enhanced routing failed");
                self.base_decision(
                    task,
                    &view,
                    format!("Enhanced routing failed: {e}"),
                    0.5,
                    vec!["Consider investigating routing failure".to_string()],
                )
            }
        };

        self.record(task, &decision);
        decision
    }

    fn record(&self, task: &Task, decision: &RoutingDecision) {
        let mut history = self.history.write();
        history.push_back(RoutingRecord {
            timestamp: Utc::now(),
            task_kind: task.kind(),
            priority: task.priority(),
            content_size: task.content_len(),
            provider: decision.provider.clone(),
            complexity: decision.complexity,
            confidence: decision.confidence,
            reasoning: decision.reasoning.clone(),
        });
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    fn update_metrics(
        &self,
        provider: &ProviderId,
        complexity: TaskComplexity,
        elapsed_ms: Option<f64>,
    ) {
        let mut metrics = self.metrics.write();
        let entry = metrics.entry((provider.clone(), complexity)).or_default();
        match elapsed_ms {
            Some(ms) => {
                entry.successes += 1;
                entry.total_response_ms += ms;
            }
            None => entry.failures += 1,
        }
    }

    /// Summary of the routing history.
    pub fn insights(&self) -> RoutingInsights {
        let history = self.history.read();

        let mut provider_distribution = BTreeMap::new();
        let mut complexity_distribution = BTreeMap::new();
        let mut confidence_sum = 0.0;
        for record in history.iter() {
            *provider_distribution.entry(record.provider.clone()).or_insert(0) += 1;
            *complexity_distribution.entry(record.complexity).or_insert(0) += 1;
            confidence_sum += record.confidence;
        }

        let average_confidence = if history.is_empty() {
            0.0
        } else {
            confidence_sum / history.len() as f64
        };

        let total_routings = history.len();
        let recent_decisions = history
            .iter()
            .skip(total_routings.saturating_sub(RECENT_DECISIONS))
            .cloned()
            .collect();
        drop(history);

        RoutingInsights {
            total_routings,
            provider_distribution,
            complexity_distribution,
            average_confidence,
            recent_decisions,
            recommendations: self.recommendations(),
        }
    }

    /// Per-provider, per-complexity outcomes of enhanced executions.
    pub fn performance(&self) -> Vec<PerformanceEntry> {
        self.metrics
            .read()
            .iter()
            .map(|((provider, complexity), m)| PerformanceEntry {
                provider: provider.clone(),
                complexity: *complexity,
                successes: m.successes,
                failures: m.failures,
                success_rate: m.success_rate(),
                avg_response_time_ms: if m.successes == 0 {
                    0.0
                } else {
                    m.total_response_ms / m.successes as f64
                },
            })
            .collect()
    }

    /// Mismatches between task complexity and provider found in the metrics.
    pub fn optimization_opportunities(&self) -> Vec<String> {
        let (default_provider, premium) = match self.base() {
            Some(base) => (base.default_provider(), base.premium_provider()),
            None => (self.config.default_provider.clone(), None),
        };

        let mut found = Vec::new();
        for ((provider, complexity), m) in self.metrics.read().iter() {
            if m.total() <= 10 {
                continue;
            }
            let rate = m.success_rate();

            if premium.as_ref() == Some(provider)
                && *complexity == TaskComplexity::Simple
                && rate > 0.9
            {
                found.push(format!(
                    "Consider cheaper providers for simple tasks ({} simple tasks sent to {provider})",
                    m.total()
                ));
            }
            if *provider == default_provider
                && matches!(complexity, TaskComplexity::Complex | TaskComplexity::Expert)
                && rate < 0.5
            {
                found.push(format!(
                    "{provider} struggling with {complexity} tasks (success rate {:.1}%)",
                    rate * 100.0
                ));
            }
        }
        found
    }

    fn history_recommendations(&self) -> Vec<String> {
        let premium = self.base().and_then(|base| base.premium_provider());
        let history = self.history.read();
        if history.is_empty() {
            return Vec::new();
        }

        let recent: Vec<&RoutingRecord> = history
            .iter()
            .skip(history.len().saturating_sub(RECENT_WINDOW))
            .collect();

        let mut recommendations = Vec::new();

        let low_confidence = recent.iter().filter(|r| r.confidence < 0.5).count();
        if low_confidence > 10 {
            recommendations.push(
                "High number of low-confidence routings detected, consider reviewing task preprocessing"
                    .to_string(),
            );
        }

        if let Some(premium) = premium {
            let premium_routings = recent.iter().filter(|r| r.provider == premium).count();
            if premium_routings > 90 {
                recommendations.push(format!(
                    "Heavy {premium} usage, consider caching repeated queries"
                ));
            }
        }

        let expert = recent
            .iter()
            .filter(|r| r.complexity == TaskComplexity::Expert)
            .count();
        if expert > 30 {
            recommendations.push(
                "Many expert-level tasks, consider breaking them into smaller subtasks".to_string(),
            );
        }

        recommendations
    }
}

#[async_trait]
impl EnhancedRouting for AgentRoutingStrategy {
    fn enabled(&self) -> bool {
        self.config.enabled && self.llm.is_some()
    }

    fn set_base_router(&self, router: Weak<dyn BaseRouter>) {
        *self.base.write() = Some(router);
    }

    async fn execute_with_enhanced_routing(
        &self,
        task: &Task,
        executor: &dyn TaskExecutor,
    ) -> Result<TaskOutput, EnhancedRoutingError> {
        if !self.enabled() {
            return Err(EnhancedRoutingError::Disabled);
        }

        let decision = self.route_task_enhanced(task).await;
        tracing::info!(
            provider = %decision.provider,
            complexity = %decision.complexity,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "Enhanced routing decision"
        );

        let annotated = task.clone().with_option(
            "routing_decision",
            json!({
                "complexity": decision.complexity,
                "estimated_tokens": decision.estimated_tokens,
                "recommended_model": decision.recommended_model,
            }),
        );

        let base = self.base();
        let chain: Vec<ProviderId> = dedupe_chain(
            std::iter::once(decision.provider.clone())
                .chain(decision.fallback_options.iter().cloned()),
        )
        .into_iter()
        .filter(|p| base.as_ref().map_or(true, |b| b.is_healthy(p)))
        .collect();
        drop(base);

        let mut last = None;
        for provider in chain {
            let started = Instant::now();
            match executor.execute(&provider, &annotated).await {
                Ok(output) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.update_metrics(&provider, decision.complexity, Some(elapsed_ms));
                    return Ok(output);
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "Enhanced attempt failed");
                    self.update_metrics(&provider, decision.complexity, None);
                    last = Some((provider, e));
                }
            }
        }

        match last {
            Some((provider, source)) => Err(EnhancedRoutingError::Execution { provider, source }),
            None => Err(EnhancedRoutingError::NoProviders),
        }
    }

    fn recommendations(&self) -> Vec<String> {
        let mut recommendations = self.history_recommendations();
        recommendations.extend(self.optimization_opportunities());
        if recommendations.is_empty() && !self.history.read().is_empty() {
            recommendations.push("Routing patterns appear optimal".to_string());
        }
        recommendations
    }
}
