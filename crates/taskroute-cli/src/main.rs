//! taskroute command-line interface.
//!
//! ```bash
//! # Where would a high-priority vision task go?
//! taskroute route --kind vision --priority 9 --content "describe this"
//!
//! # Execute against simulated providers with the primary failing
//! taskroute --format json simulate --kind vision --fail azure_openai
//!
//! # Effective configuration
//! taskroute --config router.yaml config
//! ```

mod cli;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use taskroute_core::{ProviderId, RouteDecision, RouterConfig, Task};
use taskroute_runtime::{
    Attempt, AttemptOutcome, ExecutionReport, ProviderError, TaskExecutor, TaskOutput,
    TaskRouter, UsageReport,
};

use cli::{Cli, Commands, OutputFormat, TaskArgs};

/// Executor standing in for real providers.
struct SimulatedExecutor {
    failing: Vec<ProviderId>,
    latency: Duration,
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        provider: &ProviderId,
        task: &Task,
    ) -> Result<TaskOutput, ProviderError> {
        tokio::time::sleep(self.latency).await;
        if self.failing.contains(provider) {
            tracing::debug!(provider = %provider, "Simulating provider failure");
            return Err(ProviderError::ApiError {
                status: 503,
                message: format!("{provider} is simulated as down"),
            });
        }
        let tokens = (task.content_len() / 4) as u64 + 1;
        Ok(TaskOutput::new(format!("{provider} handled {}", task.kind())).with_tokens(tokens))
    }
}

#[derive(Serialize)]
struct SimulationOutput<'a> {
    result: Option<&'a ExecutionReport>,
    error: Option<String>,
    report: &'a UsageReport,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<RouterConfig> {
    match &cli.config {
        Some(path) => RouterConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(RouterConfig::default()),
    }
}

fn build_task(args: &TaskArgs) -> Result<Task> {
    Ok(Task::new(args.kind, args.content.as_str()).with_priority(args.priority)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_decision(decision: &RouteDecision) {
    println!("task:     {}", decision.task_kind);
    println!("provider: {}", decision.provider);
    if decision.degraded {
        println!("          (no eligible provider, degraded to default)");
    }
    for candidate in &decision.candidates {
        println!("  {:<16} {:>10.2}", candidate.provider.as_str(), candidate.score);
    }
}

fn print_report(report: &UsageReport) {
    println!("generated: {}", report.generated_at.to_rfc3339());
    println!(
        "requests: {}  tokens: {}  estimated cost: ${:.4}",
        report.total_requests, report.total_tokens, report.estimated_cost
    );
    println!(
        "enhanced routing: available={} enabled={}",
        report.enhanced_available, report.enhanced_enabled
    );
    for (provider, p) in &report.providers {
        println!(
            "  {:<16} {:<9} requests={} errors={} tokens={} avg={:.1}ms",
            provider.as_str(),
            if p.healthy { "healthy" } else { "UNHEALTHY" },
            p.requests,
            p.errors,
            p.tokens,
            p.avg_response_time_ms
        );
    }
    for recommendation in &report.recommendations {
        println!("  * {recommendation}");
    }
}

fn print_attempts(attempts: &[Attempt]) {
    for (i, attempt) in attempts.iter().enumerate() {
        match &attempt.outcome {
            AttemptOutcome::Success { elapsed_ms } => {
                println!("  {}. {} ok in {elapsed_ms:.1}ms", i + 1, attempt.provider)
            }
            AttemptOutcome::Failure { error } => {
                println!("  {}. {} failed: {error}", i + 1, attempt.provider)
            }
        }
    }
}

async fn simulate(
    router: &TaskRouter,
    task: &Task,
    executor: &SimulatedExecutor,
    format: OutputFormat,
) -> Result<()> {
    let outcome = router.execute_detailed(task, executor).await;
    let report = router.report();

    match format {
        OutputFormat::Json => {
            let output = SimulationOutput {
                result: outcome.as_ref().ok(),
                error: outcome.as_ref().err().map(ToString::to_string),
                report: &report,
            };
            print_json(&output)?;
        }
        OutputFormat::Text => {
            match &outcome {
                Ok(result) => {
                    println!("attempts:");
                    print_attempts(&result.attempts);
                    println!("result: {}", result.output.content);
                }
                Err(e) => {
                    println!("attempts:");
                    print_attempts(e.attempts());
                    println!("error: {e}");
                }
            }
            println!();
            print_report(&report);
        }
    }

    router.shutdown();
    outcome?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;
    tracing::debug!(
        providers = config.providers.len(),
        default = %config.default_provider,
        "Configuration loaded"
    );

    match &cli.command {
        Commands::Route(args) => {
            let router = TaskRouter::new(config)?;
            let decision = router.route_decision(&build_task(args)?);
            match cli.format {
                OutputFormat::Json => print_json(&decision)?,
                OutputFormat::Text => print_decision(&decision),
            }
        }
        Commands::Simulate {
            task,
            fail,
            latency_ms,
        } => {
            let router = TaskRouter::new(config)?;
            let executor = SimulatedExecutor {
                failing: fail.iter().map(|p| ProviderId::new(p.as_str())).collect(),
                latency: Duration::from_millis(*latency_ms),
            };
            simulate(&router, &build_task(task)?, &executor, cli.format).await?;
        }
        Commands::Report => {
            let report = TaskRouter::new(config)?.report();
            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => print_report(&report),
            }
        }
        Commands::Config => match cli.format {
            OutputFormat::Json => print_json(&config)?,
            OutputFormat::Text => print!("{}", config.to_yaml()?),
        },
    }

    Ok(())
}
