//! Outcome records: one observed task execution.
//!
//! The JSON form is the on-disk contract of the outcome log: the timestamp is
//! written under `ts`, and the legacy keys `timestamp`, `task`, `error_msg`
//! and `error` are accepted on read. Every field has a default so sparse
//! records from adapters still parse.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::{classify, FALLBACK_ISSUE};

pub const MIN_QUALITY: i32 = 1;
pub const MAX_QUALITY: i32 = 5;
pub const DEFAULT_QUALITY: i32 = 3;

/// Ceiling applied to failing outcomes by [`SimpleOutcome`].
pub const FAILURE_QUALITY_CEILING: i32 = 2;

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn default_source() -> String {
    "generic".to_string()
}

fn default_task_type() -> String {
    "unknown".to_string()
}

fn default_success() -> bool {
    true
}

fn default_quality() -> i32 {
    DEFAULT_QUALITY
}

/// One recorded task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default = "short_id")]
    pub id: String,
    #[serde(rename = "ts", alias = "timestamp", default = "now")]
    pub timestamp: DateTime<Utc>,
    /// Origin tag (agent, service, adapter).
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_task_type", alias = "task")]
    pub task_type: String,
    #[serde(default = "default_success")]
    pub success: bool,
    /// 1–5; clamped by the store before persistence.
    #[serde(default = "default_quality")]
    pub quality: i32,
    /// Issue tags. Filled by auto-classification only when empty at record time.
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default, alias = "error_msg", alias = "error")]
    pub error_message: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            id: short_id(),
            timestamp: now(),
            source: default_source(),
            task_type: default_task_type(),
            success: true,
            quality: DEFAULT_QUALITY,
            issues: Vec::new(),
            error_message: String::new(),
            model: String::new(),
            duration_ms: 0,
            notes: String::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

impl Outcome {
    /// A successful outcome for `task_type` with every other field defaulted.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self { task_type: task_type.into(), ..Self::default() }
    }

    pub fn has_error(&self) -> bool {
        !self.error_message.is_empty()
    }
}

/// Clamp a quality score into `[1, 5]`.
pub fn clamp_quality(quality: i32) -> i32 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

// ---------------------------------------------------------------------------
// SimpleOutcome: convenience input for `OutcomeStore::record_simple`
// ---------------------------------------------------------------------------

/// Minimal description of a task result, expanded into a full [`Outcome`].
///
/// ```rust,ignore
/// store.record_simple(
///     SimpleOutcome::new("api_call").failed().error("429 Too Many Requests"),
/// )?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleOutcome {
    pub task: String,
    pub success: bool,
    pub error: Option<String>,
    pub model: Option<String>,
    pub duration_ms: Option<u64>,
    pub quality: i32,
    pub source: String,
    pub tags: Vec<String>,
    pub notes: String,
}

impl SimpleOutcome {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            success: true,
            error: None,
            model: None,
            duration_ms: None,
            quality: DEFAULT_QUALITY,
            source: default_source(),
            tags: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn quality(mut self, quality: i32) -> Self {
        self.quality = quality;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Expand into a full outcome.
    ///
    /// Classifies the error up front, tags failures with nothing to classify
    /// as `other`, and caps failing quality at 2. The store still clamps the
    /// result to `[1, 5]` independently.
    pub fn into_outcome(self) -> Outcome {
        let error = self.error.filter(|e| !e.is_empty());
        let mut issues = error.as_deref().map(classify).unwrap_or_default();
        if !self.success && issues.is_empty() {
            issues.push(FALLBACK_ISSUE.to_string());
        }
        let quality = if self.success {
            self.quality
        } else {
            self.quality.min(FAILURE_QUALITY_CEILING)
        };

        Outcome {
            source: self.source,
            task_type: self.task,
            success: self.success,
            quality,
            issues,
            error_message: error.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            duration_ms: self.duration_ms.unwrap_or(0),
            notes: self.notes,
            tags: self.tags,
            ..Outcome::default()
        }
    }
}
