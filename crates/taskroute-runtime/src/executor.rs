//! Fallback execution.
//!
//! A task is tried on the routed provider first and then on the default
//! provider, one attempt at a time. Every attempt feeds the shared state:
//! successes update the latency average and usage counters, failures take
//! the provider out of rotation. The last provider error is returned when
//! the whole chain fails.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::future::Future;
use thiserror::Error;
use tokio::time::Instant;

use taskroute_core::{ProviderId, Task};

use crate::providers::ProviderError;
use crate::router::TaskRouter;

/// Result of running a task on a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutput {
    /// Provider response
    pub content: JsonValue,

    /// Tokens consumed, when the provider reports them
    pub tokens_used: u64,
}

impl TaskOutput {
    pub fn new(content: impl Into<JsonValue>) -> Self {
        Self {
            content: content.into(),
            tokens_used: 0,
        }
    }

    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    /// The content as text, if it is a JSON string.
    pub fn as_text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

/// Caller-supplied function that performs a task on a named provider.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        provider: &ProviderId,
        task: &Task,
    ) -> Result<TaskOutput, ProviderError>;
}

#[async_trait]
impl<F, Fut> TaskExecutor for F
where
    F: Fn(ProviderId, Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutput, ProviderError>> + Send + 'static,
{
    async fn execute(
        &self,
        provider: &ProviderId,
        task: &Task,
    ) -> Result<TaskOutput, ProviderError> {
        (self)(provider.clone(), task.clone()).await
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { elapsed_ms: f64 },
    Failure { error: String },
}

/// One provider attempt, in the order it was made.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub provider: ProviderId,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl Attempt {
    fn success(provider: ProviderId, elapsed_ms: f64) -> Self {
        Self {
            provider,
            outcome: AttemptOutcome::Success { elapsed_ms },
        }
    }

    fn failure(provider: ProviderId, error: &ProviderError) -> Self {
        Self {
            provider,
            outcome: AttemptOutcome::Failure {
                error: error.to_string(),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success { .. })
    }
}

/// Successful execution with its attempt log.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub output: TaskOutput,

    /// Provider that produced the output, when it went through the router
    pub provider: Option<ProviderId>,

    /// Every attempt made, including those of the enhanced path
    pub attempts: Vec<Attempt>,

    /// True when the enhanced strategy produced the output
    pub enhanced: bool,
}

/// Errors from task execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("All {} provider attempts failed, last error: {last}", .attempts.len())]
    AllProvidersFailed {
        #[source]
        last: ProviderError,
        attempts: Vec<Attempt>,
    },

    #[error("All AI providers failed")]
    NoProviderAttempted,
}

impl ExecutionError {
    /// The error of the final attempt.
    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            Self::AllProvidersFailed { last, .. } => Some(last),
            Self::NoProviderAttempted => None,
        }
    }

    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::AllProvidersFailed { attempts, .. } => attempts,
            Self::NoProviderAttempted => &[],
        }
    }
}

/// Drop repeated providers while keeping first-seen order.
pub(crate) fn dedupe_chain(providers: impl IntoIterator<Item = ProviderId>) -> Vec<ProviderId> {
    let mut chain: Vec<ProviderId> = Vec::new();
    for provider in providers {
        if !chain.contains(&provider) {
            chain.push(provider);
        }
    }
    chain
}

/// Executor handed to the enhanced strategy so its attempts are recorded
/// exactly like basic ones.
struct TrackedExecutor<'a> {
    router: &'a TaskRouter,
    inner: &'a dyn TaskExecutor,
    attempts: Mutex<Vec<Attempt>>,
}

impl<'a> TrackedExecutor<'a> {
    fn new(router: &'a TaskRouter, inner: &'a dyn TaskExecutor) -> Self {
        Self {
            router,
            inner,
            attempts: Mutex::new(Vec::new()),
        }
    }

    fn into_attempts(self) -> Vec<Attempt> {
        self.attempts.into_inner()
    }
}

#[async_trait]
impl<'a> TaskExecutor for TrackedExecutor<'a> {
    async fn execute(
        &self,
        provider: &ProviderId,
        task: &Task,
    ) -> Result<TaskOutput, ProviderError> {
        let (result, record) = match self.router.attempt(self.inner, provider, task).await {
            Ok((output, record)) => (Ok(output), record),
            Err((error, record)) => (Err(error), record),
        };
        self.attempts.lock().push(record);
        result
    }
}

type AttemptResult = Result<(TaskOutput, Attempt), (ProviderError, Attempt)>;

impl TaskRouter {
    /// Execute `task` with fallback and return the provider output.
    pub async fn execute(
        &self,
        task: &Task,
        executor: &dyn TaskExecutor,
    ) -> Result<TaskOutput, ExecutionError> {
        self.execute_detailed(task, executor)
            .await
            .map(|report| report.output)
    }

    /// Execute `task` with fallback and return the output with its attempt log.
    ///
    /// Qualifying tasks go through the enhanced strategy first. If it fails
    /// the task falls through to the basic chain: the routed provider, then
    /// the default provider.
    pub async fn execute_detailed(
        &self,
        task: &Task,
        executor: &dyn TaskExecutor,
    ) -> Result<ExecutionReport, ExecutionError> {
        let mut attempts = Vec::new();

        if let Some(strategy) = self.enhanced_for(task) {
            let tracked = TrackedExecutor::new(self, executor);
            let result = strategy.execute_with_enhanced_routing(task, &tracked).await;
            attempts = tracked.into_attempts();

            match result {
                Ok(output) => {
                    let provider = attempts
                        .iter()
                        .rev()
                        .find(|attempt| attempt.succeeded())
                        .map(|attempt| attempt.provider.clone());
                    return Ok(ExecutionReport {
                        output,
                        provider,
                        attempts,
                        enhanced: true,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %task.kind(),
                        error = %e,
                        "Enhanced routing failed, falling back to basic routing"
                    );
                }
            }
        }

        let routed = self.route(task);
        let chain = dedupe_chain([routed, self.default_provider()]);
        let mut last_error = None;

        for provider in chain {
            match self.attempt(executor, &provider, task).await {
                Ok((output, record)) => {
                    attempts.push(record);
                    return Ok(ExecutionReport {
                        output,
                        provider: Some(provider),
                        attempts,
                        enhanced: false,
                    });
                }
                Err((error, record)) => {
                    attempts.push(record);
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(last) => Err(ExecutionError::AllProvidersFailed { last, attempts }),
            None => Err(ExecutionError::NoProviderAttempted),
        }
    }

    /// Run one attempt and apply its side effects to the shared state.
    async fn attempt(
        &self,
        executor: &dyn TaskExecutor,
        provider: &ProviderId,
        task: &Task,
    ) -> AttemptResult {
        let started = Instant::now();
        match executor.execute(provider, task).await {
            Ok(output) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.record_success(provider, elapsed_ms, output.tokens_used);
                Ok((output, Attempt::success(provider.clone(), elapsed_ms)))
            }
            Err(error) => {
                tracing::error!(provider = %provider, error = %error, "Provider attempt failed");
                self.record_failure(provider);
                let record = Attempt::failure(provider.clone(), &error);
                Err((error, record))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::TaskRouterBuilder;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use taskroute_core::TaskKind;

    /// Scripted executor: named providers fail, the rest sleep then answer "ok".
    struct Scripted {
        failing: Vec<ProviderId>,
        delay: Duration,
        calls: Mutex<Vec<ProviderId>>,
    }

    impl Scripted {
        fn new(failing: &[ProviderId]) -> Self {
            Self {
                failing: failing.to_vec(),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<ProviderId> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TaskExecutor for Scripted {
        async fn execute(
            &self,
            provider: &ProviderId,
            _task: &Task,
        ) -> Result<TaskOutput, ProviderError> {
            self.calls.lock().push(provider.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.contains(provider) {
                Err(ProviderError::ExecutionFailed(format!("{provider} down")))
            } else {
                Ok(TaskOutput::new("ok").with_tokens(42))
            }
        }
    }

    fn router() -> Arc<TaskRouter> {
        TaskRouterBuilder::new().build().unwrap()
    }

    fn vision_task() -> Task {
        Task::new(TaskKind::Vision, "image")
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_failure_falls_back_to_default() {
        let router = router();
        let executor = Scripted::new(&[ProviderId::azure_openai()]);

        let output = router.execute(&vision_task(), &executor).await.unwrap();

        assert_eq!(output.as_text(), Some("ok"));
        assert_eq!(
            executor.calls(),
            vec![ProviderId::azure_openai(), ProviderId::fallback()]
        );
        assert!(!router.is_healthy(&ProviderId::azure_openai()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_primary_rerouted_until_cooldown() {
        let router = router();
        let failing = Scripted::new(&[ProviderId::azure_openai()]);
        router.execute(&vision_task(), &failing).await.unwrap();

        // Vision now has no healthy capable provider, so it degrades to the default.
        assert_eq!(router.route(&vision_task()), ProviderId::fallback());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(router.is_healthy(&ProviderId::azure_openai()));
        assert_eq!(router.route(&vision_task()), ProviderId::azure_openai());

        // Recovery made no provider call.
        assert_eq!(failing.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_average_updates_on_success() {
        let router = router();
        let executor = Scripted::new(&[]).with_delay(Duration::from_millis(100));

        let report = router.execute_detailed(&vision_task(), &executor).await.unwrap();

        assert_eq!(report.provider, Some(ProviderId::azure_openai()));
        assert_eq!(executor.calls(), vec![ProviderId::azure_openai()]);
        assert_eq!(report.attempts.len(), 1);
        let avg = router
            .profile(&ProviderId::azure_openai())
            .unwrap()
            .avg_response_time_ms;
        // 0.9 * 500 + 0.1 * 100
        assert!((avg - 460.0).abs() < 1e-6, "avg was {avg}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_fail_returns_last_error() {
        let router = router();
        let executor = Scripted::new(&[ProviderId::azure_openai(), ProviderId::fallback()]);

        let err = router.execute(&vision_task(), &executor).await.unwrap_err();

        match &err {
            ExecutionError::AllProvidersFailed { last, attempts } => {
                assert_eq!(last.to_string(), "Execution failed: fallback down");
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|attempt| !attempt.succeeded()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(router.is_healthy(&ProviderId::fallback()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_route_is_tried_once() {
        let router = router();
        let executor = Scripted::new(&[ProviderId::fallback()]);

        // Plain text routes to the 10ms default, so the chain is a single attempt.
        let task = Task::new(TaskKind::TextGeneration, "text");
        let err = router.execute(&task, &executor).await.unwrap_err();

        assert_eq!(err.attempts().len(), 1);
        assert_eq!(executor.calls(), vec![ProviderId::fallback()]);
    }

    #[tokio::test]
    async fn test_closure_executor() {
        let router = router();
        let executor = |provider: ProviderId, _task: Task| async move {
            Ok::<_, ProviderError>(TaskOutput::new(format!("served by {provider}")))
        };

        let output = router.execute(&vision_task(), &executor).await.unwrap();
        assert_eq!(output.as_text(), Some("served by azure_openai"));
    }

    #[tokio::test]
    async fn test_usage_recorded_per_attempt() {
        let router = router();
        let executor = Scripted::new(&[ProviderId::azure_openai()]);
        router.execute(&vision_task(), &executor).await.unwrap();

        let usage: BTreeMap<_, _> = router.usage().snapshot();
        assert_eq!(usage[&ProviderId::azure_openai()].errors, 1);
        assert_eq!(usage[&ProviderId::fallback()].requests, 1);
        assert_eq!(usage[&ProviderId::fallback()].tokens, 42);
    }

    #[test]
    fn test_dedupe_chain_keeps_order() {
        let chain = dedupe_chain([
            ProviderId::fallback(),
            ProviderId::azure_openai(),
            ProviderId::fallback(),
        ]);
        assert_eq!(chain, vec![ProviderId::fallback(), ProviderId::azure_openai()]);
    }

    proptest! {
        #[test]
        fn test_dedupe_chain_is_unique_and_ordered(names in prop::collection::vec("[a-c]", 0..8)) {
            let input: Vec<ProviderId> =
                names.iter().map(|n| ProviderId::new(n.as_str())).collect();
            let chain = dedupe_chain(input.clone());

            for (i, provider) in chain.iter().enumerate() {
                prop_assert!(!chain[..i].contains(provider));
            }
            for provider in &input {
                prop_assert!(chain.contains(provider));
            }
            let mut first_seen: Vec<ProviderId> = Vec::new();
            for provider in input {
                if !first_seen.contains(&provider) {
                    first_seen.push(provider);
                }
            }
            prop_assert_eq!(chain, first_seen);
        }
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = Attempt::failure(
            ProviderId::azure_openai(),
            &ProviderError::ExecutionFailed("boom".to_string()),
        );
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["provider"], "azure_openai");
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["error"], "Execution failed: boom");
    }
}
