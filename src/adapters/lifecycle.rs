//! # Stage: Lifecycle Adapter
//!
//! ## Responsibility
//! Map agent lifecycle events (task completion, session reset, model
//! fallback, cron failure, sub-agent failure) onto outcomes with fixed task
//! types and quality, then record them.
//!
//! ## Guarantees
//! - Every outcome carries the adapter's source tag.
//! - Event outcomes go through the normal classification path, so the error
//!   text decides the issue tags.
//!
//! ## NOT Responsible For
//! - Detecting the events: the host agent calls the hooks.

use crate::error::Result;
use crate::observe::{Outcome, OutcomeStore, SimpleOutcome};

/// Source tag used when none is given.
pub const DEFAULT_SOURCE: &str = "openclaw";

/// Records agent lifecycle events as outcomes.
#[derive(Debug, Clone)]
pub struct LifecycleAdapter {
    store: OutcomeStore,
    source: String,
}

impl LifecycleAdapter {
    pub fn new(store: OutcomeStore) -> Self {
        Self { store, source: DEFAULT_SOURCE.to_string() }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A task finished; the caller's source is replaced with the adapter's.
    pub fn on_task_complete(&self, outcome: SimpleOutcome) -> Result<Outcome> {
        self.record(outcome)
    }

    /// The session was reset and its context lost.
    pub fn on_session_reset(&self, notes: &str) -> Result<Outcome> {
        self.record(
            SimpleOutcome::new("session_management")
                .failed()
                .quality(1)
                .error("Session reset: context lost")
                .notes(notes),
        )
    }

    /// The preferred model was unavailable and another one served the task.
    ///
    /// Recorded as a degraded success against the model actually used.
    pub fn on_model_fallback(&self, from: &str, to: &str, reason: &str) -> Result<Outcome> {
        self.record(
            SimpleOutcome::new("model_routing")
                .quality(2)
                .error(format!("Model fallback: {from} -> {to} ({reason})"))
                .model(to)
                .notes(format!("Fell back from {from} to {to}: {reason}")),
        )
    }

    pub fn on_cron_failure(&self, job: &str, error: &str) -> Result<Outcome> {
        self.record(
            SimpleOutcome::new("cron_management")
                .failed()
                .quality(1)
                .error(error)
                .notes(format!("Cron job '{job}' failed")),
        )
    }

    /// A sub-agent failed. An empty `model` is recorded as unknown.
    pub fn on_subagent_failure(&self, label: &str, error: &str, model: &str) -> Result<Outcome> {
        self.record(
            SimpleOutcome::new("subagent_management")
                .failed()
                .quality(1)
                .error(error)
                .model(model)
                .notes(format!("Sub-agent '{label}' failed")),
        )
    }

    fn record(&self, outcome: SimpleOutcome) -> Result<Outcome> {
        self.store.record_simple(outcome.source(self.source.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn temp_adapter() -> (TempDir, LifecycleAdapter) {
        let dir = TempDir::new().unwrap();
        let store = OutcomeStore::new(&Config::with_data_dir(dir.path().join("rsi_data")));
        (dir, LifecycleAdapter::new(store))
    }

    // ===== task completion =====

    #[test]
    fn test_task_complete_overrides_source() {
        let (_dir, adapter) = temp_adapter();
        let o = adapter
            .on_task_complete(
                SimpleOutcome::new("code_gen").model("sonnet").quality(4).source("elsewhere"),
            )
            .unwrap();
        assert_eq!(o.source, DEFAULT_SOURCE);
        assert_eq!(o.task_type, "code_gen");
        assert_eq!(o.quality, 4);
        assert!(o.success);
        assert!(o.issues.is_empty());
    }

    #[test]
    fn test_task_complete_failure_is_classified() {
        let (_dir, adapter) = temp_adapter();
        let o = adapter
            .on_task_complete(SimpleOutcome::new("api").failed().error("429 Too Many Requests"))
            .unwrap();
        assert_eq!(o.issues, vec!["rate_limit".to_string()]);
        assert_eq!(adapter.store.load(1).unwrap().len(), 1);
    }

    // ===== lifecycle events =====

    #[test]
    fn test_session_reset() {
        let (_dir, adapter) = temp_adapter();
        let o = adapter.on_session_reset("after compaction").unwrap();
        assert_eq!(o.task_type, "session_management");
        assert!(!o.success);
        assert_eq!(o.quality, 1);
        assert_eq!(o.issues, vec!["session_reset".to_string()]);
        assert_eq!(o.notes, "after compaction");
        assert!(o.model.is_empty());
    }

    #[test]
    fn test_model_fallback_is_degraded_success() {
        let (_dir, adapter) = temp_adapter();
        let o = adapter.on_model_fallback("opus", "sonnet", "unavailable").unwrap();
        assert_eq!(o.task_type, "model_routing");
        assert!(o.success);
        assert_eq!(o.quality, 2);
        assert_eq!(o.model, "sonnet");
        assert_eq!(o.issues, vec!["model_fallback".to_string()]);
        assert_eq!(o.error_message, "Model fallback: opus -> sonnet (unavailable)");
        assert_eq!(o.notes, "Fell back from opus to sonnet: unavailable");
    }

    #[test]
    fn test_cron_failure() {
        let (_dir, adapter) = temp_adapter();
        let o = adapter.on_cron_failure("nightly-backup", "job timed out").unwrap();
        assert_eq!(o.task_type, "cron_management");
        assert!(!o.success);
        assert_eq!(o.quality, 1);
        assert_eq!(o.issues, vec!["timeout".to_string()]);
        assert_eq!(o.notes, "Cron job 'nightly-backup' failed");
    }

    #[test]
    fn test_subagent_failure() {
        let (_dir, adapter) = temp_adapter();
        let o = adapter
            .on_subagent_failure("researcher", "connection refused", "haiku")
            .unwrap();
        assert_eq!(o.task_type, "subagent_management");
        assert!(!o.success);
        assert_eq!(o.model, "haiku");
        assert_eq!(o.issues, vec!["tool_error".to_string()]);
        assert_eq!(o.notes, "Sub-agent 'researcher' failed");
    }

    #[test]
    fn test_custom_source() {
        let (_dir, adapter) = temp_adapter();
        let adapter = adapter.with_source("gateway");
        assert_eq!(adapter.source(), "gateway");
        assert_eq!(adapter.on_cron_failure("j", "boom").unwrap().source, "gateway");
    }
}
