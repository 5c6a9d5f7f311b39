//! # Stage: Error Classifier
//!
//! ## Responsibility
//! Maps free-text error messages onto the fixed issue taxonomy, and reduces
//! messages to a clustering key with volatile tokens (hex ids, numbers) removed.
//!
//! ## Guarantees
//! - Deterministic: the rule table and its order are fixed; no learned state
//! - Total: every message classifies to at least one tag (`other` as fallback)
//! - Non-panicking: normalization truncates on char boundaries
//!
//! ## NOT Responsible For
//! - Deciding whether a record gets classified at all (that is the store)
//! - Mapping issues onto categories (see `analyze::pattern`)

use once_cell::sync::Lazy;
use regex::Regex;

// ---------------------------------------------------------------------------
// Issue taxonomy
// ---------------------------------------------------------------------------

/// Every issue tag the classifier and analyzer know about.
pub const ISSUE_TYPES: &[&str] = &[
    // model / routing
    "rate_limit",
    "model_fallback",
    "wrong_model_tier",
    "cost_overrun",
    "bad_routing",
    "slow_response",
    // tool / execution
    "tool_error",
    "empty_response",
    "missing_tool",
    "incomplete_task",
    // output quality
    "wrong_output",
    // memory / context
    "context_loss",
    "memory_miss",
    "compaction_lost_context",
    "session_reset",
    "hydration_fail",
    // self-governance
    "over_confirmation",
    "repeated_mistake",
    "skill_gap",
    "wal_miss",
    "timeout",
    "other",
];

/// Issues admitted into pattern mining after a single occurrence.
pub const HIGH_SEVERITY_ISSUES: &[&str] = &[
    "tool_error",
    "empty_response",
    "wrong_output",
    "session_reset",
    "cost_overrun",
    "wal_miss",
];

/// Tag applied when no rule matches.
pub const FALLBACK_ISSUE: &str = "other";

/// Placeholder substituted for runs of 8+ hex characters.
pub const ID_PLACEHOLDER: &str = "<ID>";

/// Placeholder substituted for runs of digits.
pub const NUM_PLACEHOLDER: &str = "<N>";

/// Maximum length (in chars) of a normalized clustering key.
pub const NORMALIZED_MAX_CHARS: usize = 120;

pub fn is_known_issue(issue: &str) -> bool {
    ISSUE_TYPES.contains(&issue)
}

pub fn is_high_severity(issue: &str) -> bool {
    HIGH_SEVERITY_ISSUES.contains(&issue)
}

// ---------------------------------------------------------------------------
// Keyword rules
// ---------------------------------------------------------------------------

/// One classification rule: any keyword hit contributes `issue`.
#[derive(Debug, Clone, Copy)]
struct Rule {
    keywords: &'static [&'static str],
    issue: &'static str,
}

impl Rule {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|kw| lowered.contains(kw))
    }
}

// Order is significant: tags are reported in rule order.
#[rustfmt::skip]
const RULES: &[Rule] = &[
    Rule { keywords: &["rate limit", "429", "too many requests", "quota exceeded"], issue: "rate_limit" },
    Rule { keywords: &["timeout", "timed out", "deadline exceeded"], issue: "timeout" },
    Rule { keywords: &["empty response", "empty reply", "no output", "null response"], issue: "empty_response" },
    Rule { keywords: &["context length", "token limit", "context window", "too long"], issue: "context_loss" },
    Rule { keywords: &["session reset", "session expired", "compaction"], issue: "session_reset" },
    Rule { keywords: &["model unavailable", "model not found", "fallback"], issue: "model_fallback" },
    Rule { keywords: &["permission denied", "unauthorized", "forbidden", "403"], issue: "tool_error" },
    Rule { keywords: &["not found", "404", "missing"], issue: "missing_tool" },
    Rule { keywords: &["connection refused", "connection reset", "network error"], issue: "tool_error" },
];

/// Classify an error message into issue tags.
///
/// Every matching rule contributes its tag once, in rule order. A message
/// matching nothing yields `["other"]`.
pub fn classify(message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    let mut issues: Vec<String> = Vec::new();
    for rule in RULES {
        if rule.matches(&lowered) && !issues.iter().any(|i| i == rule.issue) {
            issues.push(rule.issue.to_string());
        }
    }
    if issues.is_empty() {
        issues.push(FALLBACK_ISSUE.to_string());
    }
    issues
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

static HEX_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9a-f]{8,}").expect("hex-run pattern is valid"));
static DIGIT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("digit-run pattern is valid"));

/// Reduce an error message to a clustering key.
///
/// Lower-cases and trims, replaces hex runs of 8+ chars with `<ID>`, then
/// digit runs with `<N>`, and truncates to 120 chars. The placeholders are
/// upper-case so the digit pass cannot rewrite them.
pub fn normalize(message: &str) -> String {
    let lowered = message.to_lowercase();
    let trimmed = lowered.trim();
    let no_ids = HEX_RUN.replace_all(trimmed, ID_PLACEHOLDER);
    let no_nums = DIGIT_RUN.replace_all(&no_ids, NUM_PLACEHOLDER);
    no_nums.chars().take(NORMALIZED_MAX_CHARS).collect()
}
