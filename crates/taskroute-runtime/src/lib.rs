//! # taskroute-runtime
//!
//! Async execution layer for taskroute.
//!
//! `taskroute-core` decides where a task should run. This crate runs it:
//! - Fallback execution: routed provider first, default provider second
//! - Health tracking: failed providers leave rotation for a cooldown
//! - Latency learning: each success updates the provider's moving average
//! - Optional enhanced routing through a pluggable strategy, with a
//!   model-assisted implementation
//! - Streaming with in-band error reporting
//! - Usage and health reports
//!
//! Provider calls are made by the caller's [`TaskExecutor`]; this crate
//! never talks to a provider API itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use taskroute_core::{ProviderId, Task, TaskKind};
//! use taskroute_runtime::{ProviderError, TaskOutput, TaskRouter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let router = TaskRouter::builder().build()?;
//!
//! let executor = |provider: ProviderId, task: Task| async move {
//!     Ok::<_, ProviderError>(TaskOutput::new(format!("{provider}: {}", task.content())))
//! };
//!
//! let output = router
//!     .execute(&Task::new(TaskKind::Vision, "describe this image"), &executor)
//!     .await?;
//! println!("{}", output.content);
//! # Ok(())
//! # }
//! ```

pub mod enhanced;
pub mod executor;
pub mod gate;
pub mod health;
pub mod prompts;
pub mod providers;
pub mod report;
pub mod router;
pub mod streaming;
pub mod usage;

pub use enhanced::{
    AgentRoutingConfig, AgentRoutingStrategy, BaseRouter, EnhancedRouting, EnhancedRoutingError,
    RoutingDecision, TaskComplexity,
};
pub use executor::{
    Attempt, AttemptOutcome, ExecutionError, ExecutionReport, TaskExecutor, TaskOutput,
};
pub use gate::EnhancedGate;
pub use health::{HealthMonitor, ProviderHealth};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
pub use report::{ProviderBreakdown, UsageReport};
pub use router::{TaskRouter, TaskRouterBuilder};
pub use streaming::{ChunkStream, StreamingBackend};
pub use usage::{ProviderUsage, UsageTracker};
