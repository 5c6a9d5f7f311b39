//! # rsi-loop
//!
//! Observation and analysis half of a recursive self-improvement loop for
//! autonomous agents. Task outcomes are appended to a JSONL log, error text is
//! classified into issue tags, and a periodic pass mines the log for recurring
//! failure patterns, cross-source correlations and a health score. Each pattern
//! gets a templated fix proposal.
//!
//! ## Stages
//! - [`observe`]: outcome record, error classifier, append-only store
//! - [`analyze`]: pattern mining, recurrence tracking, correlation, health
//! - [`fix`]: templated fix proposals gated by safe categories
//! - [`adapters`]: lifecycle hooks and the HTTP webhook
//! - [`inbox`]: file-drop ingestion for agents that cannot link the crate
//! - [`pipeline`]: [`RsiLoop`], one cycle or a cancellable background loop

pub mod adapters;
pub mod analyze;
pub mod cli;
pub mod config;
pub mod error;
pub mod fix;
pub mod inbox;
pub mod observe;
pub mod pipeline;

pub use adapters::LifecycleAdapter;
pub use analyze::{Analyzer, Category, Correlation, Pattern, Trend};
pub use config::Config;
pub use error::{Result, RsiError};
pub use fix::{Fix, FixStatus, Fixer};
pub use inbox::Inbox;
pub use observe::{classify, normalize, Outcome, OutcomeStore, SimpleOutcome};
pub use pipeline::RsiLoop;
