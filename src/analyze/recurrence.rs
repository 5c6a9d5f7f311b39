//! # Stage: Recurrence Tracker
//!
//! ## Responsibility
//! Persists the ranked patterns of one analysis as a snapshot and, on the next
//! analysis, marks patterns whose `(task_type, issue)` key reappears as
//! recurring with a frequency trend.
//!
//! ## Guarantees
//! - Two-cycle comparison: only the immediately preceding snapshot is consulted
//! - Non-fatal reads: a missing or corrupt snapshot means "no prior patterns"
//! - Whole-document overwrite on save
//!
//! ## NOT Responsible For
//! - Long-term pattern history

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::pattern::{Pattern, Trend};
use crate::config::Config;
use crate::error::{Result, RsiError};

/// Prior-cycle frequency keyed by `(task_type, issue)`.
pub type PriorPatterns = HashMap<(String, String), usize>;

/// Lenient view of one persisted pattern; only the recurrence fields matter.
#[derive(Debug, Deserialize)]
struct PriorEntry {
    #[serde(default)]
    task_type: String,
    #[serde(default)]
    issue: String,
    #[serde(default)]
    frequency: usize,
}

#[derive(Debug, Deserialize)]
struct SnapshotDoc {
    #[serde(default)]
    patterns: Vec<PriorEntry>,
}

#[derive(Serialize)]
struct SnapshotDocRef<'a> {
    patterns: &'a [Pattern],
}

/// File-backed snapshot of the last analysis's patterns.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(config: &Config) -> Self {
        Self { path: config.patterns_path() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous snapshot. Never fails: unreadable state is empty.
    ///
    /// When several patterns share a key (error clusters all share
    /// `("mixed", "error_cluster")`), the last one in the snapshot wins.
    pub fn load_previous(&self) -> PriorPatterns {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PriorPatterns::new(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "pattern snapshot unreadable, treating as empty"
                );
                return PriorPatterns::new();
            }
        };
        match serde_json::from_str::<SnapshotDoc>(&text) {
            Ok(doc) => doc
                .patterns
                .into_iter()
                .map(|p| ((p.task_type, p.issue), p.frequency))
                .collect(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "pattern snapshot corrupt, treating as empty"
                );
                PriorPatterns::new()
            }
        }
    }

    /// Overwrite the snapshot with `patterns`.
    pub fn save(&self, patterns: &[Pattern]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| RsiError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(&SnapshotDocRef { patterns })?;
        fs::write(&self.path, json).map_err(|e| RsiError::io(&self.path, e))
    }
}

/// Mark patterns present in `prior` as recurring.
///
/// Trend is `Increasing` when frequency rose against the prior snapshot,
/// otherwise `Stable`. Unmatched patterns are left as `New`.
pub fn mark_recurrences(patterns: &mut [Pattern], prior: &PriorPatterns) {
    for p in patterns.iter_mut() {
        let key = (p.task_type.clone(), p.issue.clone());
        if let Some(&prev_freq) = prior.get(&key) {
            p.recurring = true;
            p.trend = if p.frequency > prev_freq { Trend::Increasing } else { Trend::Stable };
        }
    }
}
