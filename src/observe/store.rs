//! # Stage: Outcome Store
//!
//! ## Responsibility
//! Append-only JSONL log of [`Outcome`] records with a recency-filtered reader.
//! Records are auto-classified and quality-clamped on the way in.
//!
//! ## Guarantees
//! - Append-only: prior lines are never rewritten or deleted
//! - One write per record: each line is serialized in full and appended with a
//!   single `write_all`, so concurrent readers see whole records or nothing
//! - Tolerant reads: malformed lines (bad JSON, bad timestamp, invalid UTF-8)
//!   are skipped, never fatal
//!
//! ## NOT Responsible For
//! - Retention or compaction of old records (caller-managed)
//! - Cross-process locking

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::debug;

use super::classifier::classify;
use super::outcome::{clamp_quality, Outcome, SimpleOutcome};
use crate::config::Config;
use crate::error::{Result, RsiError};

/// JSONL-backed outcome log.
#[derive(Debug, Clone)]
pub struct OutcomeStore {
    path: PathBuf,
    window_days: u32,
    recurrence_threshold: usize,
}

impl OutcomeStore {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.outcomes_path(),
            window_days: config.analysis_window_days,
            recurrence_threshold: config.recurrence_threshold,
        }
    }

    /// Path of the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default look-back window, in days.
    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Default threshold for [`recurrences`](Self::recurrences).
    pub fn recurrence_threshold(&self) -> usize {
        self.recurrence_threshold
    }

    /// Persist one outcome and return it as stored.
    ///
    /// An outcome carrying an error message but no issues is classified
    /// first; caller-supplied issues are kept as they are. Quality is clamped
    /// into `[1, 5]` whatever the success flag.
    pub fn record(&self, mut outcome: Outcome) -> Result<Outcome> {
        if outcome.has_error() && outcome.issues.is_empty() {
            outcome.issues = classify(&outcome.error_message);
        }
        outcome.quality = clamp_quality(outcome.quality);

        self.append(&outcome)?;
        debug!(
            id = %outcome.id,
            task_type = %outcome.task_type,
            success = outcome.success,
            issues = ?outcome.issues,
            "recorded outcome"
        );
        Ok(outcome)
    }

    /// Expand a [`SimpleOutcome`] and record it.
    pub fn record_simple(&self, simple: SimpleOutcome) -> Result<Outcome> {
        self.record(simple.into_outcome())
    }

    /// Load every record stamped within the last `window_days`, in append order.
    ///
    /// A missing log is an empty window. Lines that fail to parse are skipped,
    /// and quality read back from older or hand-written lines is clamped.
    pub fn load(&self, window_days: u32) -> Result<Vec<Outcome>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RsiError::io(&self.path, e)),
        };

        // Windows reaching past the representable range mean "everything".
        let cutoff = Utc::now().checked_sub_signed(Duration::days(i64::from(window_days)));
        let mut outcomes = Vec::new();
        let mut skipped = 0usize;

        for (lineno, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            let line = raw.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Outcome>(line) {
                Ok(o) if cutoff.is_some_and(|c| o.timestamp < c) => {}
                Ok(mut o) => {
                    o.quality = clamp_quality(o.quality);
                    outcomes.push(o);
                }
                Err(e) => {
                    skipped += 1;
                    debug!(line = lineno + 1, error = %e, "skipping malformed outcome line");
                }
            }
        }

        if skipped > 0 {
            debug!(path = %self.path.display(), skipped, "outcome log contained malformed lines");
        }
        Ok(outcomes)
    }

    /// Load the default window.
    pub fn load_recent(&self) -> Result<Vec<Outcome>> {
        self.load(self.window_days)
    }

    /// Issue tags seen at least `threshold` times in the default window.
    pub fn recurrences(&self, threshold: usize) -> Result<BTreeMap<String, usize>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for outcome in self.load_recent()? {
            for issue in outcome.issues {
                *counts.entry(issue).or_insert(0) += 1;
            }
        }
        counts.retain(|_, count| *count >= threshold);
        Ok(counts)
    }

    fn append(&self, outcome: &Outcome) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| RsiError::io(dir, e))?;
        }
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RsiError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| RsiError::io(&self.path, e))
    }
}
