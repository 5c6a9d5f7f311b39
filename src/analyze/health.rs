//! # Stage: Health Scorer
//!
//! Reduces an outcome window to one number in `[0, 1]`:
//! `(successes / total) * (avg_quality / 5)`, rounded to three decimals.
//! An empty window scores 1.0; no data is not evidence of failure.

use crate::observe::outcome::{clamp_quality, Outcome, MAX_QUALITY};

pub fn health_score(outcomes: &[Outcome]) -> f64 {
    if outcomes.is_empty() {
        return 1.0;
    }
    let total = outcomes.len() as f64;
    let successes = outcomes.iter().filter(|o| o.success).count() as f64;
    let avg_quality = outcomes
        .iter()
        .map(|o| f64::from(clamp_quality(o.quality)))
        .sum::<f64>()
        / total;
    let score = (successes / total) * (avg_quality / f64::from(MAX_QUALITY));
    (score * 1000.0).round() / 1000.0
}
