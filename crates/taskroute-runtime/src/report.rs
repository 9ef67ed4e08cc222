//! Usage and health report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use taskroute_core::ProviderId;

use crate::router::TaskRouter;
use crate::usage::ProviderUsage;

/// Error rate above which a provider is flagged.
const HIGH_ERROR_RATE: f64 = 0.1;

/// Requests needed before the error rate is judged.
const MIN_REQUESTS_FOR_ERROR_RATE: u64 = 10;

/// Share of requests on the premium provider that triggers the caching hint.
const PREMIUM_SHARE_FOR_CACHING: f64 = 0.8;

/// Prefix of recommendations coming from the enhanced strategy.
pub const ENHANCED_PREFIX: &str = "[enhanced] ";

/// Usage of one provider as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderBreakdown {
    pub requests: u64,
    pub tokens: u64,
    pub errors: u64,
    pub estimated_cost: f64,
    pub avg_response_time_ms: f64,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_since: Option<DateTime<Utc>>,
}

/// Snapshot of router health and usage.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub health: BTreeMap<ProviderId, bool>,
    pub recommendations: Vec<String>,
    pub enhanced_available: bool,
    pub enhanced_enabled: bool,
    pub generated_at: DateTime<Utc>,
    pub providers: BTreeMap<ProviderId, ProviderBreakdown>,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

/// Advice derived from health and usage counters.
pub fn usage_recommendations(
    health: &BTreeMap<ProviderId, bool>,
    usage: &BTreeMap<ProviderId, ProviderUsage>,
    premium: Option<&ProviderId>,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for (provider, healthy) in health {
        if !healthy {
            recommendations.push(format!("{provider} is unhealthy, check configuration"));
        }
    }

    for (provider, stats) in usage {
        if stats.requests > MIN_REQUESTS_FOR_ERROR_RATE && stats.error_rate() > HIGH_ERROR_RATE {
            recommendations.push(format!("{provider} has a high error rate, check configuration"));
        }
    }

    let total: u64 = usage.values().map(|u| u.requests).sum();
    if let Some(premium) = premium {
        let premium_requests = usage.get(premium).map_or(0, |u| u.requests);
        if total > 0 && premium_requests as f64 / total as f64 > PREMIUM_SHARE_FOR_CACHING {
            recommendations.push(format!(
                "{premium} serves most requests, consider caching frequent queries"
            ));
        }
    }

    recommendations
}

impl TaskRouter {
    /// Build a report of current health, usage and recommendations.
    pub fn report(&self) -> UsageReport {
        let health_detail = self.health().snapshot();
        let health: BTreeMap<ProviderId, bool> = health_detail
            .iter()
            .map(|(id, h)| (id.clone(), h.healthy))
            .collect();
        let usage = self.usage().snapshot();

        let mut recommendations =
            usage_recommendations(&health, &usage, self.premium_provider().as_ref());

        let (enhanced_available, enhanced_enabled) = match self.enhanced() {
            Some(strategy) => (true, strategy.enabled()),
            None => (false, false),
        };
        if let Some(strategy) = self.enhanced().filter(|s| s.enabled()) {
            recommendations.extend(
                strategy
                    .recommendations()
                    .into_iter()
                    .map(|r| format!("{ENHANCED_PREFIX}{r}")),
            );
        }

        let mut providers = BTreeMap::new();
        for profile in self.profiles() {
            let stats = usage.get(&profile.name).copied().unwrap_or_default();
            let detail = health_detail.get(&profile.name);
            providers.insert(
                profile.name.clone(),
                ProviderBreakdown {
                    requests: stats.requests,
                    tokens: stats.tokens,
                    errors: stats.errors,
                    estimated_cost: stats.tokens as f64 / 1000.0 * profile.cost_per_1k_tokens,
                    avg_response_time_ms: profile.avg_response_time_ms,
                    healthy: detail.map_or(true, |h| h.healthy),
                    down_since: detail.and_then(|h| h.down_since),
                },
            );
        }

        UsageReport {
            total_requests: providers.values().map(|p| p.requests).sum(),
            total_tokens: providers.values().map(|p| p.tokens).sum(),
            estimated_cost: providers.values().map(|p| p.estimated_cost).sum(),
            health,
            recommendations,
            enhanced_available,
            enhanced_enabled,
            generated_at: Utc::now(),
            providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhanced::{
        AgentRoutingConfig, AgentRoutingStrategy, BaseRouter, EnhancedRouting, EnhancedRoutingError,
    };
    use crate::executor::{TaskExecutor, TaskOutput};
    use crate::providers::ProviderError;
    use crate::router::TaskRouterBuilder;
    use async_trait::async_trait;
    use std::sync::{Arc, Weak};
    use taskroute_core::{Task, TaskKind};

    fn usage(requests: u64, errors: u64) -> ProviderUsage {
        ProviderUsage {
            requests,
            tokens: 0,
            errors,
        }
    }

    #[test]
    fn test_unhealthy_and_error_rate_recommendations() {
        let mut health = BTreeMap::new();
        health.insert(ProviderId::azure_openai(), false);
        health.insert(ProviderId::fallback(), true);

        let mut counters = BTreeMap::new();
        counters.insert(ProviderId::azure_openai(), usage(5, 5));
        counters.insert(ProviderId::fallback(), usage(20, 3));

        let recommendations =
            usage_recommendations(&health, &counters, Some(&ProviderId::azure_openai()));
        assert_eq!(
            recommendations,
            vec![
                "azure_openai is unhealthy, check configuration".to_string(),
                "fallback has a high error rate, check configuration".to_string(),
            ]
        );
    }

    #[test]
    fn test_error_rate_needs_enough_requests() {
        let mut counters = BTreeMap::new();
        counters.insert(ProviderId::fallback(), usage(10, 9));
        assert!(usage_recommendations(&BTreeMap::new(), &counters, None).is_empty());
    }

    #[test]
    fn test_premium_caching_hint() {
        let mut counters = BTreeMap::new();
        counters.insert(ProviderId::azure_openai(), usage(9, 0));
        counters.insert(ProviderId::fallback(), usage(1, 0));

        let recommendations =
            usage_recommendations(&BTreeMap::new(), &counters, Some(&ProviderId::azure_openai()));
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].contains("caching"));

        counters.insert(ProviderId::fallback(), usage(3, 0));
        assert!(
            usage_recommendations(&BTreeMap::new(), &counters, Some(&ProviderId::azure_openai()))
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_report_after_execution() {
        let router = TaskRouterBuilder::new().build().unwrap();
        let executor = |provider: ProviderId, _task: Task| async move {
            if provider == ProviderId::azure_openai() {
                Err(ProviderError::ExecutionFailed("down".to_string()))
            } else {
                Ok(TaskOutput::new("ok").with_tokens(2000))
            }
        };
        router
            .execute(&Task::new(TaskKind::Vision, "img"), &executor)
            .await
            .unwrap();

        let report = router.report();
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.total_tokens, 2000);
        assert_eq!(report.estimated_cost, 0.0);
        assert!(!report.health[&ProviderId::azure_openai()]);
        assert!(report.providers[&ProviderId::azure_openai()].down_since.is_some());
        assert!(!report.enhanced_available);
        assert_eq!(
            report.recommendations,
            vec!["azure_openai is unhealthy, check configuration".to_string()]
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["providers"]["fallback"]["tokens"], 2000);
        assert_eq!(json["health"]["azure_openai"], false);
    }

    struct Advising;

    #[async_trait]
    impl EnhancedRouting for Advising {
        fn enabled(&self) -> bool {
            true
        }

        fn set_base_router(&self, _router: Weak<dyn BaseRouter>) {}

        async fn execute_with_enhanced_routing(
            &self,
            _task: &Task,
            _executor: &dyn TaskExecutor,
        ) -> Result<TaskOutput, EnhancedRoutingError> {
            Err(EnhancedRoutingError::NoProviders)
        }

        fn recommendations(&self) -> Vec<String> {
            vec!["Routing patterns appear optimal".to_string()]
        }
    }

    #[test]
    fn test_enhanced_recommendations_are_prefixed() {
        let router = TaskRouterBuilder::new()
            .enhanced(Arc::new(Advising))
            .build()
            .unwrap();

        let report = router.report();
        assert!(report.enhanced_available);
        assert!(report.enhanced_enabled);
        assert_eq!(
            report.recommendations,
            vec!["[enhanced] Routing patterns appear optimal".to_string()]
        );
    }

    #[test]
    fn test_disabled_strategy_is_available_but_silent() {
        let strategy = AgentRoutingStrategy::without_model(AgentRoutingConfig::default());
        let router = TaskRouterBuilder::new()
            .enhanced(Arc::new(strategy))
            .build()
            .unwrap();

        let report = router.report();
        assert!(report.enhanced_available);
        assert!(!report.enhanced_enabled);
        assert!(report.recommendations.is_empty());
    }
}
