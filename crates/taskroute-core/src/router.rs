//! Route selection: capability filter followed by scoring.
//!
//! Selection never fails. When no provider survives the filter the task is
//! sent to the default provider, which is degraded but always available.

use serde::Serialize;

use crate::filter::{eligible_providers, HealthView};
use crate::registry::ProviderRegistry;
use crate::scorer::Scorer;
use crate::types::{ProviderId, Task, TaskKind};

/// Score of one candidate provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub provider: ProviderId,
    pub score: f64,
}

/// Outcome of routing one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    /// Kind of the routed task
    pub task_kind: TaskKind,

    /// Selected provider
    pub provider: ProviderId,

    /// Every eligible provider with its score, in registry order
    pub candidates: Vec<ScoredCandidate>,

    /// True when no provider was eligible and the default was used
    pub degraded: bool,
}

/// Instrumentation boundary around a routing decision.
///
/// Passed explicitly into route selection so the routing logic carries no
/// hidden dependency on a tracing backend. Implementations must not
/// influence the outcome.
pub trait RouteTracer: Send + Sync {
    /// Called before the filter runs.
    fn route_started(&self, task: &Task);

    /// Called with the final decision.
    fn route_finished(&self, task: &Task, decision: &RouteDecision);
}

/// Tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl RouteTracer for NoopTracer {
    fn route_started(&self, _task: &Task) {}

    fn route_finished(&self, _task: &Task, _decision: &RouteDecision) {}
}

/// Tracer that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl RouteTracer for LogTracer {
    fn route_started(&self, task: &Task) {
        tracing::debug!(
            kind = %task.kind(),
            priority = task.priority(),
            content_len = task.content_len(),
            "Routing task"
        );
    }

    fn route_finished(&self, task: &Task, decision: &RouteDecision) {
        if decision.degraded {
            tracing::warn!(
                kind = %task.kind(),
                provider = %decision.provider,
                "No suitable providers, routing to default"
            );
        } else {
            tracing::info!(
                kind = %task.kind(),
                provider = %decision.provider,
                candidates = decision.candidates.len(),
                "Routed task"
            );
        }
    }
}

/// Pick a provider for `task`.
///
/// Candidates are scored in registry order and the first provider reaching
/// the maximum score wins, so ties resolve deterministically.
pub fn select_provider<H>(
    registry: &ProviderRegistry,
    health: &H,
    scorer: &Scorer,
    task: &Task,
    tracer: &dyn RouteTracer,
) -> RouteDecision
where
    H: HealthView + ?Sized,
{
    tracer.route_started(task);

    let candidates: Vec<ScoredCandidate> = eligible_providers(registry, health, task)
        .into_iter()
        .map(|profile| ScoredCandidate {
            provider: profile.name.clone(),
            score: scorer.score(profile, task),
        })
        .collect();

    let mut best: Option<&ScoredCandidate> = None;
    for candidate in &candidates {
        match best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }

    let decision = match best {
        Some(winner) => RouteDecision {
            task_kind: task.kind(),
            provider: winner.provider.clone(),
            candidates: candidates.clone(),
            degraded: false,
        },
        None => RouteDecision {
            task_kind: task.kind(),
            provider: registry.default_provider().clone(),
            candidates: Vec::new(),
            degraded: true,
        },
    };

    tracer.route_finished(task, &decision);
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AllHealthy;
    use crate::registry::ProviderProfile;
    use crate::scorer::ScoringWeights;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn two_provider_registry() -> ProviderRegistry {
        ProviderRegistry::new(
            vec![
                ProviderProfile::new("primary", 8192)
                    .with_latency_ms(500.0)
                    .with_success_rate(1.0)
                    .with_vision(true),
                ProviderProfile::new("fallback", 1000).with_latency_ms(10.0),
            ],
            ProviderId::new("fallback"),
            Some(ProviderId::new("primary")),
        )
        .unwrap()
    }

    fn route(
        registry: &ProviderRegistry,
        health: &BTreeMap<ProviderId, bool>,
        task: &Task,
    ) -> RouteDecision {
        let scorer = Scorer::for_registry(registry, ScoringWeights::default());
        select_provider(registry, health, &scorer, task, &NoopTracer)
    }

    #[test]
    fn test_vision_routes_to_only_capable_provider() {
        let registry = two_provider_registry();
        let task = Task::new(TaskKind::Vision, "image bytes");
        let decision = route(&registry, &BTreeMap::new(), &task);

        assert_eq!(decision.provider, ProviderId::new("primary"));
        assert_eq!(decision.candidates.len(), 1);
        assert!(!decision.degraded);
    }

    #[test]
    fn test_unhealthy_primary_excluded() {
        let registry = two_provider_registry();
        let mut health = BTreeMap::new();
        health.insert(ProviderId::new("primary"), false);

        let text = Task::new(TaskKind::TextGeneration, "hi").with_priority(9).unwrap();
        assert_eq!(route(&registry, &health, &text).provider, ProviderId::new("fallback"));
    }

    #[test]
    fn test_no_candidates_degrades_to_default() {
        let registry = two_provider_registry();
        let mut health = BTreeMap::new();
        health.insert(ProviderId::new("primary"), false);

        let vision = Task::new(TaskKind::Vision, "image");
        let decision = route(&registry, &health, &vision);
        assert_eq!(decision.provider, ProviderId::new("fallback"));
        assert!(decision.degraded);
        assert!(decision.candidates.is_empty());
    }

    #[test]
    fn test_priority_nine_prefers_primary_at_comparable_latency() {
        let registry = ProviderRegistry::new(
            vec![
                ProviderProfile::new("primary", 8192)
                    .with_latency_ms(500.0)
                    .with_success_rate(1.0),
                ProviderProfile::new("fallback", 1000).with_latency_ms(500.0),
            ],
            ProviderId::new("fallback"),
            Some(ProviderId::new("primary")),
        )
        .unwrap();
        let task = Task::new(TaskKind::TextGeneration, "hi").with_priority(9).unwrap();
        let decision = route(&registry, &BTreeMap::new(), &task);

        assert_eq!(decision.provider, ProviderId::new("primary"));
        assert!(decision.candidates[0].score > decision.candidates[1].score);
    }

    #[test]
    fn test_ties_resolve_to_first_declared() {
        let registry = ProviderRegistry::new(
            vec![
                ProviderProfile::new("alpha", 100).with_latency_ms(200.0),
                ProviderProfile::new("beta", 100).with_latency_ms(200.0),
                ProviderProfile::new("fallback", 100).with_latency_ms(200.0),
            ],
            ProviderId::new("fallback"),
            None,
        )
        .unwrap();
        let task = Task::new(TaskKind::TextGeneration, "hi");
        let decision = route(&registry, &BTreeMap::new(), &task);

        assert_eq!(decision.candidates[0].score, decision.candidates[1].score);
        assert_eq!(decision.provider, ProviderId::new("alpha"));
    }

    #[derive(Default)]
    struct RecordingTracer {
        events: Mutex<Vec<String>>,
    }

    impl RouteTracer for RecordingTracer {
        fn route_started(&self, task: &Task) {
            self.events.lock().unwrap().push(format!("start:{}", task.kind()));
        }

        fn route_finished(&self, _task: &Task, decision: &RouteDecision) {
            self.events.lock().unwrap().push(format!("end:{}", decision.provider));
        }
    }

    #[test]
    fn test_tracer_sees_start_and_end() {
        let registry = two_provider_registry();
        let scorer = Scorer::for_registry(&registry, ScoringWeights::default());
        let tracer = RecordingTracer::default();
        let task = Task::new(TaskKind::Vision, "image");

        let decision = select_provider(&registry, &AllHealthy, &scorer, &task, &tracer);
        let untraced = select_provider(&registry, &AllHealthy, &scorer, &task, &NoopTracer);

        assert_eq!(decision, untraced);
        assert_eq!(
            *tracer.events.lock().unwrap(),
            vec!["start:vision".to_string(), "end:primary".to_string()]
        );
    }

    fn arb_kind() -> impl Strategy<Value = TaskKind> {
        prop_oneof![
            Just(TaskKind::TextGeneration),
            Just(TaskKind::Vision),
            Just(TaskKind::Embedding),
            Just(TaskKind::Streaming),
        ]
    }

    proptest! {
        #[test]
        fn prop_routed_provider_has_capability_or_is_default(
            kind in arb_kind(),
            priority in 0u8..=10,
            primary_healthy in any::<bool>(),
            vision in any::<bool>(),
            streaming in any::<bool>(),
            latency in 1.0f64..2_000.0,
        ) {
            let registry = ProviderRegistry::new(
                vec![
                    ProviderProfile::new("primary", 8192)
                        .with_latency_ms(latency)
                        .with_vision(vision)
                        .with_streaming(streaming)
                        .with_embeddings(true),
                    ProviderProfile::new("fallback", 1000).with_latency_ms(10.0),
                ],
                ProviderId::new("fallback"),
                Some(ProviderId::new("primary")),
            ).unwrap();
            let mut health = BTreeMap::new();
            health.insert(ProviderId::new("primary"), primary_healthy);

            let task = Task::new(kind, "payload").with_priority(priority).unwrap();
            let decision = route(&registry, &health, &task);
            let profile = registry.get(&decision.provider).unwrap();
            prop_assert!(profile.can_serve(&task) || registry.is_default(&decision.provider));
        }
    }
}
