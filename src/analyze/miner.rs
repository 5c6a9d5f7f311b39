//! # Stage: Pattern Miner
//!
//! ## Responsibility
//! Turns the outcome window into a ranked list of [`Pattern`]s:
//!
//! 1. **Key groups**: outcomes grouped by every `(task_type, issue)` pair they
//!    carry; untagged outcomes group under `none`.
//! 2. **Admission**: high-severity issues need one occurrence, all others two.
//! 3. **Statistics**: failure rate, mean quality, and
//!    `impact = (n / total) * (5 - avg_quality)`.
//! 4. **Error clusters**: outcomes with an error message grouped by their
//!    normalized text; clusters of two or more become `error_cluster` patterns.
//! 5. **Recurrence**: matched against the previous snapshot.
//! 6. **Ranking**: descending impact, top 20 kept and saved as the next
//!    cycle's snapshot.
//!
//! ## Guarantees
//! - Deterministic: groups are emitted in first-seen order and the sort is
//!   stable, so equal-impact patterns keep that order
//! - Bounded: at most [`MAX_PATTERNS`] patterns are returned
//! - An empty window returns no patterns and leaves the snapshot untouched
//!
//! ## NOT Responsible For
//! - Proposing fixes for patterns (see `fix`)

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::correlate::{correlate, Correlation};
use super::health::health_score;
use super::pattern::{
    category_for, Category, Pattern, Trend, ERROR_CLUSTER_ISSUE, ERROR_CLUSTER_TASK,
    MAX_SAMPLE_ERRORS, NO_ISSUE,
};
use super::recurrence::{mark_recurrences, SnapshotStore};
use crate::config::Config;
use crate::error::Result;
use crate::observe::classifier::{is_high_severity, normalize};
use crate::observe::outcome::{clamp_quality, Outcome, MAX_QUALITY};
use crate::observe::OutcomeStore;

/// Most patterns returned (and snapshotted) per analysis.
pub const MAX_PATTERNS: usize = 20;

/// Smallest error cluster reported as a pattern.
pub const MIN_CLUSTER_SIZE: usize = 2;

/// Occurrences needed before a `(task_type, issue)` group becomes a pattern.
pub fn admission_threshold(issue: &str) -> usize {
    if is_high_severity(issue) {
        1
    } else {
        2
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Reads the outcome log and mines it for patterns, health and correlations.
#[derive(Debug, Clone)]
pub struct Analyzer {
    store: OutcomeStore,
    snapshots: SnapshotStore,
}

impl Analyzer {
    pub fn new(config: &Config) -> Self {
        Self::with_store(OutcomeStore::new(config), config)
    }

    /// Analyzer over an existing store; the snapshot lives under `config.data_dir`.
    pub fn with_store(store: OutcomeStore, config: &Config) -> Self {
        Self { store, snapshots: SnapshotStore::new(config) }
    }

    pub fn store(&self) -> &OutcomeStore {
        &self.store
    }

    /// Mine the last `window_days` of outcomes into ranked patterns.
    ///
    /// Also overwrites the recurrence snapshot with the returned patterns.
    pub fn analyze(&self, window_days: u32) -> Result<Vec<Pattern>> {
        let outcomes = self.store.load(window_days)?;
        if outcomes.is_empty() {
            debug!(window_days, "no outcomes in window, skipping analysis");
            return Ok(Vec::new());
        }

        let mut patterns = mine_patterns(&outcomes);
        let prior = self.snapshots.load_previous();
        mark_recurrences(&mut patterns, &prior);
        rank(&mut patterns);
        self.snapshots.save(&patterns)?;

        info!(
            outcomes = outcomes.len(),
            patterns = patterns.len(),
            recurring = patterns.iter().filter(|p| p.recurring).count(),
            "analysis complete"
        );
        Ok(patterns)
    }

    /// Health of the last `window_days`; see [`health_score`].
    pub fn health_score(&self, window_days: u32) -> Result<f64> {
        Ok(health_score(&self.store.load(window_days)?))
    }

    /// Cross-source issue correlations in the last `window_days`.
    pub fn cross_source_correlations(&self, window_days: u32) -> Result<Vec<Correlation>> {
        Ok(correlate(&self.store.load(window_days)?))
    }
}

// ---------------------------------------------------------------------------
// Mining
// ---------------------------------------------------------------------------

/// Key-grouped and error-clustered patterns for `outcomes`, unranked and
/// without recurrence marking.
pub fn mine_patterns(outcomes: &[Outcome]) -> Vec<Pattern> {
    let total = outcomes.len();
    let mut patterns = Vec::new();

    for ((task, issue), group) in group_by_key(outcomes) {
        let n = group.len();
        if n < admission_threshold(&issue) {
            continue;
        }
        let stats = GroupStats::compute(&group, total);
        let category = category_for(&issue);
        let first_seen = group.iter().map(|o| o.timestamp).min();
        let last_seen = group.iter().map(|o| o.timestamp).max();

        patterns.push(Pattern {
            id: format!("{}-{}-{}", prefix(&task, 8), prefix(&issue, 8), n),
            category,
            description: format!(
                "In '{task}' tasks, '{issue}' occurs {n}x with {:.0}% failure rate",
                stats.failure_rate * 100.0
            ),
            sample_errors: group
                .iter()
                .filter(|o| o.has_error())
                .take(MAX_SAMPLE_ERRORS)
                .map(|o| o.error_message.clone())
                .collect(),
            suggested_action: category.suggested_action().to_string(),
            sources: distinct_sources(&group),
            task_type: task,
            issue,
            frequency: n,
            impact_score: stats.impact,
            failure_rate: stats.failure_rate,
            first_seen,
            last_seen,
            recurring: false,
            trend: Trend::New,
        });
    }

    for (norm, group) in cluster_by_error(outcomes) {
        let n = group.len();
        if n < MIN_CLUSTER_SIZE {
            continue;
        }
        let stats = GroupStats::compute(&group, total);
        patterns.push(Pattern {
            id: cluster_id(&norm, n),
            category: Category::ErrorCluster,
            task_type: ERROR_CLUSTER_TASK.to_string(),
            issue: ERROR_CLUSTER_ISSUE.to_string(),
            frequency: n,
            impact_score: stats.impact,
            failure_rate: stats.failure_rate,
            description: format!("Error cluster ({n}x): {}", prefix(&norm, 60)),
            sample_errors: group
                .iter()
                .take(MAX_SAMPLE_ERRORS)
                .map(|o| o.error_message.clone())
                .collect(),
            suggested_action: Category::ErrorCluster.suggested_action().to_string(),
            sources: distinct_sources(&group),
            first_seen: None,
            last_seen: None,
            recurring: false,
            trend: Trend::New,
        });
    }

    patterns
}

/// Sort descending by impact and keep the top [`MAX_PATTERNS`].
pub fn rank(patterns: &mut Vec<Pattern>) {
    patterns.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
    patterns.truncate(MAX_PATTERNS);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GroupStats {
    failure_rate: f64,
    impact: f64,
}

impl GroupStats {
    fn compute(group: &[&Outcome], total: usize) -> Self {
        let n = group.len() as f64;
        let failures = group.iter().filter(|o| !o.success).count() as f64;
        let avg_quality =
            group.iter().map(|o| f64::from(clamp_quality(o.quality))).sum::<f64>() / n;
        let quality_deficit = f64::from(MAX_QUALITY) - avg_quality;
        Self {
            failure_rate: failures / n,
            impact: (n / total as f64) * quality_deficit,
        }
    }
}

/// Group outcomes by `(task_type, issue)`, preserving first-seen order.
fn group_by_key(outcomes: &[Outcome]) -> Vec<((String, String), Vec<&Outcome>)> {
    group_ordered(outcomes.iter().flat_map(|o| {
        let mut issues: Vec<&str> = Vec::new();
        for issue in &o.issues {
            if !issues.contains(&issue.as_str()) {
                issues.push(issue);
            }
        }
        if issues.is_empty() {
            issues.push(NO_ISSUE);
        }
        issues
            .into_iter()
            .map(move |issue| ((o.task_type.clone(), issue.to_string()), o))
    }))
}

/// Group outcomes carrying an error message by normalized text.
fn cluster_by_error(outcomes: &[Outcome]) -> Vec<(String, Vec<&Outcome>)> {
    group_ordered(
        outcomes
            .iter()
            .filter(|o| o.has_error())
            .map(|o| (normalize(&o.error_message), o)),
    )
}

fn group_ordered<'a, K, I>(items: I) -> Vec<(K, Vec<&'a Outcome>)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = (K, &'a Outcome)>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&'a Outcome>)> = Vec::new();
    for (key, outcome) in items {
        match index.get(&key) {
            Some(&i) => groups[i].1.push(outcome),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![outcome]));
            }
        }
    }
    groups
}

fn distinct_sources(group: &[&Outcome]) -> Vec<String> {
    group
        .iter()
        .map(|o| o.source.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Stable id for an error cluster: SHA-1 of the normalized text plus size.
fn cluster_id(normalized: &str, n: usize) -> String {
    let digest = Sha1::digest(normalized.as_bytes());
    let hex: String = digest.iter().take(5).map(|b| format!("{b:02x}")).collect();
    format!("err-{hex}-{n}")
}

fn prefix(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
