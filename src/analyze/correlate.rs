//! # Stage: Correlator
//!
//! ## Responsibility
//! Detects pairs of issue tags that together point at a named higher-order
//! problem, when the pair was observed across more than one source.
//!
//! ## Guarantees
//! - Cross-component only: a pair seen within a single source is not reported
//! - Output follows the fixed pair-table order; issues and sources are sorted

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::observe::Outcome;

/// Issue pairs that jointly indicate a named failure.
const CORRELATED_ISSUES: &[([&str; 2], &str)] = &[
    (["session_reset", "context_loss"], "context_management"),
    (["cost_overrun", "wrong_model_tier"], "model_routing"),
    (["empty_response", "tool_error"], "tool_reliability"),
    (["hydration_fail", "context_loss"], "session_recovery"),
];

/// A correlated issue pair observed across sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    /// The two issue tags, sorted.
    pub issues: Vec<String>,
    /// Name of the higher-order problem the pair indicates.
    pub correlation: String,
    /// Union of sources that reported either tag, sorted.
    pub sources: Vec<String>,
}

/// Correlated issue pairs present in `outcomes`.
pub fn correlate(outcomes: &[Outcome]) -> Vec<Correlation> {
    let mut issue_sources: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for o in outcomes {
        for issue in &o.issues {
            issue_sources.entry(issue.as_str()).or_default().insert(o.source.as_str());
        }
    }

    CORRELATED_ISSUES
        .iter()
        .filter_map(|(pair, name)| {
            let a = issue_sources.get(pair[0])?;
            let b = issue_sources.get(pair[1])?;
            let sources: BTreeSet<&str> = a.union(b).copied().collect();
            if sources.len() < 2 {
                return None;
            }
            let mut issues = vec![pair[0].to_string(), pair[1].to_string()];
            issues.sort();
            Some(Correlation {
                issues,
                correlation: (*name).to_string(),
                sources: sources.into_iter().map(str::to_string).collect(),
            })
        })
        .collect()
}
