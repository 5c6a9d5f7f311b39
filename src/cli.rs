use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::adapters::webhook::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(name = "rsi-loop")]
#[command(version)]
#[command(about = "Record agent task outcomes and mine them for recurring failure patterns")]
pub struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record one task outcome
    Record {
        /// Task type, e.g. code_gen or web_search
        task: String,

        /// Mark the task as failed
        #[arg(long)]
        failed: bool,

        /// Error message; classified into issue tags
        #[arg(long)]
        error: Option<String>,

        /// Model that ran the task
        #[arg(long)]
        model: Option<String>,

        /// Wall-clock duration in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Quality 1..=5 (clamped)
        #[arg(long, default_value = "3", allow_negative_numbers = true)]
        quality: i32,

        /// Reporting subsystem
        #[arg(long, default_value = "generic")]
        source: String,

        /// Free-form tag; repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Mine the outcome window for patterns (no fixes are proposed)
    Analyze {
        /// Window in days; defaults to the configured window
        #[arg(long)]
        days: Option<u32>,
    },

    /// Print the health score of the outcome window
    Health {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Issue pairs that co-occur across sources
    Correlations {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Issue tags at or above the recurrence threshold
    Recurrences {
        /// Minimum count; defaults to the configured threshold
        #[arg(long)]
        threshold: Option<usize>,
    },

    /// List saved fix proposals
    Fixes,

    /// Record every outcome JSON file dropped into a directory
    Ingest {
        dir: PathBuf,
    },

    /// Run one analysis cycle, or keep cycling with --interval
    Run {
        /// Seconds between background cycles; runs once when omitted
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Serve the HTTP webhook (POST /observe, GET /health, GET /patterns)
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
