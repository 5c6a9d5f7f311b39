//! Pattern records and the fixed issue → category → action lookups.
//!
//! A [`Pattern`] is recomputed from scratch on every analysis; the JSON form is
//! what the recurrence snapshot persists between cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::observe::classifier::ISSUE_TYPES;

/// Task type reported by error-cluster patterns.
pub const ERROR_CLUSTER_TASK: &str = "mixed";

/// Issue reported by error-cluster patterns.
pub const ERROR_CLUSTER_ISSUE: &str = "error_cluster";

/// Sentinel issue for outcomes that carry no issue tags.
pub const NO_ISSUE: &str = "none";

/// Most raw error samples kept on a pattern.
pub const MAX_SAMPLE_ERRORS: usize = 3;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Coarse bucket a pattern's issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SkillGap,
    ModelRouting,
    MemoryContinuity,
    BehaviorPattern,
    ToolReliability,
    /// Text-clustered pattern, not tied to a single issue tag.
    ErrorCluster,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SkillGap => "skill_gap",
            Category::ModelRouting => "model_routing",
            Category::MemoryContinuity => "memory_continuity",
            Category::BehaviorPattern => "behavior_pattern",
            Category::ToolReliability => "tool_reliability",
            Category::ErrorCluster => "error_cluster",
            Category::Other => "other",
        }
    }

    /// Human-readable next step for patterns in this category.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Category::SkillGap => "Create or improve relevant skill/tool",
            Category::ModelRouting => "Update model routing configuration",
            Category::MemoryContinuity => "Improve memory and context protocols",
            Category::BehaviorPattern => "Update agent behavior rules",
            Category::ToolReliability => "Add retry logic or fallback tools",
            Category::ErrorCluster => "Investigate common error pattern",
            Category::Other => "Investigate and address",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Issue → category, covering every tag in the taxonomy.
const ISSUE_CATEGORIES: &[(&str, Category)] = &[
    ("skill_gap", Category::SkillGap),
    ("missing_tool", Category::SkillGap),
    ("wrong_output", Category::SkillGap),
    ("rate_limit", Category::ModelRouting),
    ("model_fallback", Category::ModelRouting),
    ("wrong_model_tier", Category::ModelRouting),
    ("slow_response", Category::ModelRouting),
    ("context_loss", Category::MemoryContinuity),
    ("memory_miss", Category::MemoryContinuity),
    ("compaction_lost_context", Category::MemoryContinuity),
    ("repeated_mistake", Category::BehaviorPattern),
    ("over_confirmation", Category::BehaviorPattern),
    ("bad_routing", Category::BehaviorPattern),
    ("tool_error", Category::ToolReliability),
    ("timeout", Category::ToolReliability),
    ("empty_response", Category::ToolReliability),
    // deliberately uncategorised
    ("cost_overrun", Category::Other),
    ("incomplete_task", Category::Other),
    ("session_reset", Category::Other),
    ("hydration_fail", Category::Other),
    ("wal_miss", Category::Other),
    ("other", Category::Other),
];

/// Category for an issue tag; tags outside the table fall back to `Other`.
pub fn category_for(issue: &str) -> Category {
    ISSUE_CATEGORIES
        .iter()
        .find(|(tag, _)| *tag == issue)
        .map(|(_, cat)| *cat)
        .unwrap_or(Category::Other)
}

/// Taxonomy tags with no explicit category entry.
///
/// Non-empty means a tag was added to the taxonomy without deciding its
/// category, so it silently falls back to `other`.
pub fn unmapped_issues() -> Vec<&'static str> {
    ISSUE_TYPES
        .iter()
        .copied()
        .filter(|issue| !ISSUE_CATEGORIES.iter().any(|(tag, _)| tag == issue))
        .collect()
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

/// Frequency movement of a pattern against the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// No matching pattern in the previous snapshot.
    #[default]
    New,
    Stable,
    Increasing,
    /// Accepted from persisted snapshots; recurrence marking never assigns it.
    Decreasing,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::New => write!(f, "new"),
            Trend::Stable => write!(f, "stable"),
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A mined recurring issue, ranked by impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub category: Category,
    pub task_type: String,
    pub issue: String,
    /// Number of contributing outcomes.
    pub frequency: usize,
    /// `(frequency / window_total) * (5 - avg_quality)`, written at 4 decimals.
    #[serde(serialize_with = "round_4")]
    pub impact_score: f64,
    /// Failures over frequency, in `[0, 1]`, written at 3 decimals.
    #[serde(serialize_with = "round_3")]
    pub failure_rate: f64,
    pub description: String,
    /// Up to three raw error messages.
    #[serde(default)]
    pub sample_errors: Vec<String>,
    pub suggested_action: String,
    /// Distinct contributing sources, sorted.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Earliest contributing timestamp; `""` on error clusters.
    #[serde(default, with = "seen_at")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, with = "seen_at")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub trend: Trend,
}

fn round_to<S: Serializer>(value: f64, scale: f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((value * scale).round() / scale)
}

fn round_4<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    round_to(*value, 10_000.0, s)
}

fn round_3<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    round_to(*value, 1_000.0, s)
}

/// Optional timestamps written as RFC 3339, or `""` when unknown.
mod seen_at {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => s.serialize_str(&ts.to_rfc3339()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)?.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

impl Pattern {
    /// Grouping key used for recurrence matching.
    pub fn key(&self) -> (&str, &str) {
        (&self.task_type, &self.issue)
    }

    pub fn is_error_cluster(&self) -> bool {
        self.category == Category::ErrorCluster
    }
}
