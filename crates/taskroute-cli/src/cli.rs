//! Command-line argument definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use taskroute_core::TaskKind;

/// Route AI tasks to providers and inspect the decisions.
#[derive(Parser, Debug)]
#[command(name = "taskroute", version, about, long_about = None)]
pub struct Cli {
    /// Router configuration file (YAML, or JSON by extension)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show where a task would be routed and the score of every candidate.
    Route(TaskArgs),

    /// Execute a task against simulated providers.
    Simulate {
        #[command(flatten)]
        task: TaskArgs,

        /// Provider that fails every call (repeatable)
        #[arg(long = "fail", value_name = "PROVIDER")]
        fail: Vec<String>,

        /// Simulated latency of every call
        #[arg(long, default_value_t = 100)]
        latency_ms: u64,
    },

    /// Show the usage report of a freshly built router.
    Report,

    /// Print the effective configuration as YAML.
    Config,
}

/// Description of the task to route.
#[derive(Args, Debug)]
pub struct TaskArgs {
    /// Task kind: text_generation, vision, embedding or streaming
    #[arg(long, short, default_value = "text_generation")]
    pub kind: TaskKind,

    /// Priority from 0 to 10
    #[arg(long, short, default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub priority: u8,

    /// Task payload
    #[arg(long, default_value = "")]
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
