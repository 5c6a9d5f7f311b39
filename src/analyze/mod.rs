//! # Module: analyze
//!
//! Periodic batch analysis over the outcome window.
//!
//! ## Sub-modules
//! - [`pattern`]: `Pattern`, `Category`, `Trend`, issue → category lookups
//! - [`miner`]: grouping, admission, impact scoring, clustering, ranking
//! - [`recurrence`]: previous-cycle snapshot and recurrence marking
//! - [`correlate`]: cross-source issue-pair correlations
//! - [`health`]: single-number health indicator

pub mod correlate;
pub mod health;
pub mod miner;
pub mod pattern;
pub mod recurrence;

pub use correlate::Correlation;
pub use miner::Analyzer;
pub use pattern::{Category, Pattern, Trend};
