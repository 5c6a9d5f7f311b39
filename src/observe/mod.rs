//! # Module: observe
//!
//! Ingestion side of the pipeline: outcome records, error classification,
//! and the append-only outcome log.
//!
//! ## Sub-modules
//! - [`outcome`]: `Outcome` record and the `SimpleOutcome` convenience input
//! - [`classifier`]: keyword rules, issue taxonomy, clustering normalizer
//! - [`store`]: JSONL outcome log: record, load, recurrences

pub mod classifier;
pub mod outcome;
pub mod store;

pub use classifier::{classify, normalize};
pub use outcome::{Outcome, SimpleOutcome};
pub use store::OutcomeStore;
