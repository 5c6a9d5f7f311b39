//! # Stage: Fix Proposer
//!
//! ## Responsibility
//! Turns mined [`Pattern`]s into fix proposals using a fixed issue → template
//! lookup. Proposals in a configured safe category are marked applied; the
//! rest are saved as drafts for human review.
//!
//! ## Guarantees
//! - Every proposal carries the `pattern_id` it was derived from
//! - One JSON document per proposal, named after the fix id
//! - Corrupt proposal files are skipped when loading
//!
//! ## NOT Responsible For
//! - Changing code or configuration: "applied" records the decision only; the
//!   agent integration carries out the change

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analyze::Pattern;
use crate::config::Config;
use crate::error::{Result, RsiError};

// ---------------------------------------------------------------------------
// Fix types
// ---------------------------------------------------------------------------

/// Kind of remediation a template proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCategory {
    RetryLogic,
    RoutingConfig,
    ThresholdTuning,
    Investigation,
}

impl FixCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixCategory::RetryLogic => "retry_logic",
            FixCategory::RoutingConfig => "routing_config",
            FixCategory::ThresholdTuning => "threshold_tuning",
            FixCategory::Investigation => "investigation",
        }
    }
}

impl std::fmt::Display for FixCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    Auto,
    #[default]
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    #[default]
    Draft,
    Proposed,
    Applied,
    Rejected,
}

impl std::fmt::Display for FixStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixStatus::Draft => write!(f, "draft"),
            FixStatus::Proposed => write!(f, "proposed"),
            FixStatus::Applied => write!(f, "applied"),
            FixStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// One concrete change a fix asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixChange {
    pub target: String,
    pub action: String,
    pub detail: String,
}

/// A fix proposal for one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fix {
    pub id: String,
    /// Id of the pattern this fix addresses.
    pub pattern_id: String,
    #[serde(rename = "type")]
    pub kind: FixKind,
    pub status: FixStatus,
    pub target: String,
    pub changes: Vec<FixChange>,
    /// Template category when it is safe to auto-apply, else empty.
    pub safe_category: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Default for Fix {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            pattern_id: String::new(),
            kind: FixKind::Manual,
            status: FixStatus::Draft,
            target: String::new(),
            changes: Vec::new(),
            safe_category: String::new(),
            description: String::new(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[rustfmt::skip]
const FIX_TEMPLATES: &[(&str, FixCategory, &str)] = &[
    ("rate_limit",       FixCategory::RetryLogic,      "Add/increase retry backoff for rate-limited endpoints"),
    ("model_fallback",   FixCategory::RoutingConfig,   "Update model fallback chain configuration"),
    ("wrong_model_tier", FixCategory::RoutingConfig,   "Adjust tier classification thresholds"),
    ("cost_overrun",     FixCategory::RoutingConfig,   "Lower cost ceiling or adjust model routing"),
    ("slow_response",    FixCategory::ThresholdTuning, "Increase timeout thresholds or add circuit breaker"),
    ("timeout",          FixCategory::ThresholdTuning, "Increase timeout thresholds or add circuit breaker"),
    ("empty_response",   FixCategory::RetryLogic,      "Add empty-response detection and retry"),
    ("session_reset",    FixCategory::Investigation,   "Investigate context management protocols"),
];

fn template_for(issue: &str) -> Option<(FixCategory, &'static str)> {
    FIX_TEMPLATES
        .iter()
        .find(|(tag, _, _)| *tag == issue)
        .map(|(_, cat, desc)| (*cat, *desc))
}

fn changes_for(category: FixCategory, pattern: &Pattern) -> Vec<FixChange> {
    let change = match category {
        FixCategory::RoutingConfig => FixChange {
            target: "model routing config".into(),
            action: "Review and adjust routing thresholds".into(),
            detail: format!("Pattern '{}' suggests routing misconfiguration", pattern.issue),
        },
        FixCategory::RetryLogic => FixChange {
            target: "relevant integration code".into(),
            action: format!("Add retry with backoff for '{}' errors", pattern.issue),
            detail: format!("Detected {}x occurrences", pattern.frequency),
        },
        FixCategory::ThresholdTuning => FixChange {
            target: "relevant config".into(),
            action: format!("Adjust thresholds to reduce '{}'", pattern.issue),
            detail: format!("Current failure rate: {:.0}%", pattern.failure_rate * 100.0),
        },
        FixCategory::Investigation => return Vec::new(),
    };
    vec![change]
}

// ---------------------------------------------------------------------------
// Fixer
// ---------------------------------------------------------------------------

/// Proposes, gates and persists fixes.
#[derive(Debug, Clone)]
pub struct Fixer {
    proposals_dir: PathBuf,
    config: Config,
}

impl Fixer {
    pub fn new(config: &Config) -> Self {
        Self {
            proposals_dir: config.proposals_dir(),
            config: config.clone(),
        }
    }

    pub fn proposals_dir(&self) -> &Path {
        &self.proposals_dir
    }

    /// Build a proposal for `pattern` without persisting it.
    pub fn propose(&self, pattern: &Pattern) -> Fix {
        let (category, description) = match template_for(&pattern.issue) {
            Some((cat, desc)) => (cat, desc.to_string()),
            None => (
                FixCategory::Investigation,
                format!("Address '{}' in '{}' tasks", pattern.issue, pattern.task_type),
            ),
        };
        let safe = self.config.is_safe_category(category.as_str());
        let changes = changes_for(category, pattern);

        Fix {
            pattern_id: pattern.id.clone(),
            kind: if safe { FixKind::Auto } else { FixKind::Manual },
            status: if safe { FixStatus::Proposed } else { FixStatus::Draft },
            target: changes.first().map(|c| c.target.clone()).unwrap_or_default(),
            changes,
            safe_category: if safe { category.as_str().to_string() } else { String::new() },
            description,
            ..Fix::default()
        }
    }

    /// Mark `fix` applied when it is safe and auto-fix is enabled, otherwise
    /// draft. Persists the proposal either way and returns whether it applied.
    pub fn apply_if_safe(&self, fix: &mut Fix) -> Result<bool> {
        let applied = self.config.auto_fix_enabled
            && !fix.safe_category.is_empty()
            && self.config.is_safe_category(&fix.safe_category);
        fix.status = if applied { FixStatus::Applied } else { FixStatus::Draft };
        self.save(fix)?;
        if applied {
            info!(
                fix = %fix.id,
                pattern = %fix.pattern_id,
                category = %fix.safe_category,
                "fix applied"
            );
        } else {
            debug!(fix = %fix.id, pattern = %fix.pattern_id, "fix saved as draft");
        }
        Ok(applied)
    }

    pub fn propose_and_apply(&self, pattern: &Pattern) -> Result<Fix> {
        let mut fix = self.propose(pattern);
        self.apply_if_safe(&mut fix)?;
        Ok(fix)
    }

    /// Every saved proposal, ordered by file name.
    pub fn load_proposals(&self) -> Result<Vec<Fix>> {
        let entries = match fs::read_dir(&self.proposals_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RsiError::io(&self.proposals_dir, e)),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut fixes = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<Fix>(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(fix) => fixes.push(fix),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable proposal")
                }
            }
        }
        Ok(fixes)
    }

    fn save(&self, fix: &Fix) -> Result<PathBuf> {
        fs::create_dir_all(&self.proposals_dir)
            .map_err(|e| RsiError::io(&self.proposals_dir, e))?;
        let path = self.proposals_dir.join(format!("{}.json", fix.id));
        let json = serde_json::to_string_pretty(fix)?;
        fs::write(&path, json).map_err(|e| RsiError::io(&path, e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{Category, Trend};
    use tempfile::TempDir;

    fn pattern(issue: &str) -> Pattern {
        Pattern {
            id: format!("api-{issue}-3"),
            category: Category::Other,
            task_type: "api".into(),
            issue: issue.into(),
            frequency: 3,
            impact_score: 1.0,
            failure_rate: 0.5,
            description: String::new(),
            sample_errors: vec![],
            suggested_action: String::new(),
            sources: vec![],
            first_seen: None,
            last_seen: None,
            recurring: false,
            trend: Trend::New,
        }
    }

    fn temp_fixer(config: impl FnOnce(&mut Config)) -> (TempDir, Fixer) {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::with_data_dir(dir.path().join("rsi_data"));
        config(&mut cfg);
        (dir, Fixer::new(&cfg))
    }

    // ===== propose =====

    #[test]
    fn test_propose_safe_retry() {
        let (_dir, fixer) = temp_fixer(|_| {});
        let fix = fixer.propose(&pattern("rate_limit"));
        assert_eq!(fix.pattern_id, "api-rate_limit-3");
        assert_eq!(fix.kind, FixKind::Auto);
        assert_eq!(fix.status, FixStatus::Proposed);
        assert_eq!(fix.safe_category, "retry_logic");
        assert_eq!(fix.target, "relevant integration code");
        assert_eq!(fix.changes[0].detail, "Detected 3x occurrences");
    }

    #[test]
    fn test_propose_threshold_detail_has_rate() {
        let (_dir, fixer) = temp_fixer(|_| {});
        let fix = fixer.propose(&pattern("timeout"));
        assert_eq!(fix.changes[0].detail, "Current failure rate: 50%");
    }

    #[test]
    fn test_propose_unknown_issue_is_manual_investigation() {
        let (_dir, fixer) = temp_fixer(|_| {});
        let fix = fixer.propose(&pattern("tool_error"));
        assert_eq!(fix.kind, FixKind::Manual);
        assert_eq!(fix.status, FixStatus::Draft);
        assert!(fix.safe_category.is_empty());
        assert!(fix.changes.is_empty());
        assert_eq!(fix.description, "Address 'tool_error' in 'api' tasks");
    }

    #[test]
    fn test_propose_unsafe_category_is_manual() {
        let (_dir, fixer) = temp_fixer(|c| c.safe_categories = vec!["retry_logic".into()]);
        let fix = fixer.propose(&pattern("model_fallback"));
        assert_eq!(fix.kind, FixKind::Manual);
        assert_eq!(fix.changes[0].target, "model routing config");
    }

    // ===== apply / persist =====

    #[test]
    fn test_apply_safe_fix() {
        let (_dir, fixer) = temp_fixer(|_| {});
        let fix = fixer.propose_and_apply(&pattern("rate_limit")).unwrap();
        assert_eq!(fix.status, FixStatus::Applied);
        assert!(fixer.proposals_dir().join(format!("{}.json", fix.id)).exists());
    }

    #[test]
    fn test_apply_unsafe_fix_saved_as_draft() {
        let (_dir, fixer) = temp_fixer(|_| {});
        let mut fix = fixer.propose(&pattern("session_reset"));
        assert!(!fixer.apply_if_safe(&mut fix).unwrap());
        assert_eq!(fix.status, FixStatus::Draft);
        assert_eq!(fixer.load_proposals().unwrap().len(), 1);
    }

    #[test]
    fn test_auto_fix_disabled_never_applies() {
        let (_dir, fixer) = temp_fixer(|c| c.auto_fix_enabled = false);
        let fix = fixer.propose_and_apply(&pattern("rate_limit")).unwrap();
        assert_eq!(fix.status, FixStatus::Draft);
        assert_eq!(fix.safe_category, "retry_logic");
    }

    #[test]
    fn test_apply_rechecks_configured_safe_categories() {
        let (_dir, fixer) = temp_fixer(|c| c.safe_categories = vec!["retry_logic".into()]);
        let mut fix = Fix {
            pattern_id: "api-model_fa-3".into(),
            safe_category: "routing_config".into(),
            ..Fix::default()
        };
        assert!(!fixer.apply_if_safe(&mut fix).unwrap());
        assert_eq!(fix.status, FixStatus::Draft);
    }

    #[test]
    fn test_load_proposals_empty_when_missing() {
        let (_dir, fixer) = temp_fixer(|_| {});
        assert!(fixer.load_proposals().unwrap().is_empty());
    }

    #[test]
    fn test_load_proposals_roundtrip_and_skip_corrupt() {
        let (_dir, fixer) = temp_fixer(|_| {});
        let fix = fixer.propose_and_apply(&pattern("timeout")).unwrap();
        fs::write(fixer.proposals_dir().join("zzz.json"), "{broken").unwrap();
        fs::write(fixer.proposals_dir().join("notes.txt"), "ignored").unwrap();
        let loaded = fixer.load_proposals().unwrap();
        assert_eq!(loaded, vec![fix]);
    }

    #[test]
    fn test_fix_json_uses_type_key() {
        let json = serde_json::to_value(Fix::default()).unwrap();
        assert_eq!(json["type"], "manual");
        assert_eq!(json["status"], "draft");
    }
}
