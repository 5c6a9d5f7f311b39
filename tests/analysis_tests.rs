//! End-to-end tests for the observe and analyze stages: recording, window
//! loading, pattern mining, recurrence across cycles, correlation and health.

use std::fs;
use std::io::Write;

use chrono::{Duration, Utc};
use rsi_loop::analyze::miner::MAX_PATTERNS;
use rsi_loop::{Analyzer, Category, Config, Outcome, OutcomeStore, SimpleOutcome, Trend};
use tempfile::TempDir;

fn setup() -> (TempDir, Config, OutcomeStore, Analyzer) {
    let dir = TempDir::new().unwrap();
    let config = Config::with_data_dir(dir.path().join("rsi_data"));
    let store = OutcomeStore::new(&config);
    let analyzer = Analyzer::with_store(store.clone(), &config);
    (dir, config, store, analyzer)
}

fn fail(store: &OutcomeStore, task: &str, error: &str) {
    store
        .record_simple(SimpleOutcome::new(task).failed().error(error))
        .unwrap();
}

fn append_raw(config: &Config, line: &str) {
    fs::create_dir_all(&config.data_dir).unwrap();
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.outcomes_path())
        .unwrap();
    writeln!(f, "{line}").unwrap();
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_rate_limit_three_times_yields_model_routing_pattern() {
    let (_dir, _config, store, analyzer) = setup();
    for _ in 0..3 {
        fail(&store, "api_call", "429 Too Many Requests");
    }
    let patterns = analyzer.analyze(7).unwrap();
    let p = patterns
        .iter()
        .find(|p| p.task_type == "api_call" && p.issue == "rate_limit")
        .expect("rate_limit pattern");
    assert_eq!(p.frequency, 3);
    assert_eq!(p.category, Category::ModelRouting);
    assert_eq!(p.category.to_string(), "model_routing");
}

#[test]
fn test_single_high_severity_issue_is_admitted() {
    let (_dir, _config, store, analyzer) = setup();
    fail(&store, "file_read", "Permission denied: /etc/passwd");
    let patterns = analyzer.analyze(7).unwrap();
    assert!(patterns.iter().any(|p| p.issue == "tool_error" && p.frequency == 1));
}

#[test]
fn test_single_low_severity_issue_is_not_admitted() {
    let (_dir, _config, store, analyzer) = setup();
    fail(&store, "search", "timed out waiting");
    let patterns = analyzer.analyze(7).unwrap();
    assert!(patterns.iter().all(|p| p.issue != "timeout"));
}

#[test]
fn test_volatile_tokens_cluster_together() {
    let (_dir, _config, store, analyzer) = setup();
    for host in ["abc0def", "abc1def", "abc2def"] {
        fail(&store, "fetch", &format!("Connection refused to host {host}: port 8080"));
    }
    let patterns = analyzer.analyze(7).unwrap();
    let clusters: Vec<_> = patterns.iter().filter(|p| p.is_error_cluster()).collect();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].frequency, 3);
    assert_eq!(clusters[0].sample_errors.len(), 3);
    assert!(clusters[0].sample_errors[0].contains("abc0def"));
}

#[test]
fn test_record_simple_failure_without_error_is_other() {
    let (_dir, _config, store, _analyzer) = setup();
    let outcome = store
        .record_simple(SimpleOutcome::new("anything").failed())
        .unwrap();
    assert_eq!(outcome.issues, vec!["other".to_string()]);
}

// ---------------------------------------------------------------------------
// Store properties
// ---------------------------------------------------------------------------

#[test]
fn test_caller_issues_survive_classification() {
    let (_dir, _config, store, _analyzer) = setup();
    let outcome = Outcome {
        success: false,
        issues: vec!["wrong_output".to_string()],
        error_message: "429 rate limit".to_string(),
        ..Outcome::new("review")
    };
    let recorded = store.record(outcome).unwrap();
    assert_eq!(recorded.issues, vec!["wrong_output".to_string()]);
    assert_eq!(store.load(1).unwrap()[0].issues, vec!["wrong_output".to_string()]);
}

#[test]
fn test_record_clamps_quality() {
    let (_dir, _config, store, _analyzer) = setup();
    let high = store.record(Outcome { quality: 42, ..Outcome::new("t") }).unwrap();
    let low = store.record(Outcome { quality: -7, ..Outcome::new("t") }).unwrap();
    assert_eq!(high.quality, 5);
    assert_eq!(low.quality, 1);
}

#[test]
fn test_load_skips_malformed_lines() {
    let (_dir, config, store, _analyzer) = setup();
    fail(&store, "a", "timeout");
    append_raw(&config, "{not json");
    append_raw(&config, "");
    fail(&store, "b", "timeout");
    assert_eq!(store.load(7).unwrap().len(), 2);
}

#[test]
fn test_load_accepts_legacy_keys() {
    let (_dir, config, store, _analyzer) = setup();
    let ts = Utc::now().to_rfc3339();
    append_raw(
        &config,
        &format!(
            r#"{{"timestamp": "{ts}", "task": "legacy", "success": false, "error_msg": "boom"}}"#
        ),
    );
    let loaded = store.load(7).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].task_type, "legacy");
    assert_eq!(loaded[0].error_message, "boom");
}

#[test]
fn test_load_filters_by_window() {
    let (_dir, config, store, _analyzer) = setup();
    let old = (Utc::now() - Duration::days(30)).to_rfc3339();
    append_raw(&config, &format!(r#"{{"ts": "{old}", "task_type": "old"}}"#));
    fail(&store, "new", "timeout");
    assert_eq!(store.load(7).unwrap().len(), 1);
    assert_eq!(store.load(60).unwrap().len(), 2);
}

#[test]
fn test_recurrences_threshold() {
    let (_dir, _config, store, _analyzer) = setup();
    for _ in 0..3 {
        fail(&store, "api", "rate limit");
    }
    fail(&store, "api", "timeout");
    let counts = store.recurrences(3).unwrap();
    assert_eq!(counts.get("rate_limit"), Some(&3));
    assert!(!counts.contains_key("timeout"));
}

// ---------------------------------------------------------------------------
// Analysis properties
// ---------------------------------------------------------------------------

#[test]
fn test_empty_window_analysis() {
    let (_dir, config, _store, analyzer) = setup();
    assert!(analyzer.analyze(7).unwrap().is_empty());
    assert!(analyzer.cross_source_correlations(7).unwrap().is_empty());
    assert_eq!(analyzer.health_score(7).unwrap(), 1.0);
    assert!(!config.patterns_path().exists());
}

#[test]
fn test_patterns_sorted_and_capped() {
    let (_dir, _config, store, analyzer) = setup();
    // distinct letters keep the error texts from clustering
    for c in 'a'..='y' {
        fail(&store, &format!("task_{c}"), &format!("empty response from tool {c}"));
    }
    for _ in 0..4 {
        fail(&store, "hot", "429 rate limit");
    }
    let patterns = analyzer.analyze(7).unwrap();
    assert_eq!(patterns.len(), MAX_PATTERNS);
    assert!(patterns
        .windows(2)
        .all(|w| w[0].impact_score >= w[1].impact_score));
    assert_eq!(patterns[0].frequency, 4);
}

#[test]
fn test_recurrence_across_cycles() {
    let (_dir, config, store, analyzer) = setup();
    fail(&store, "search", "timeout");
    fail(&store, "search", "timeout");

    let first = analyzer.analyze(7).unwrap();
    let p = first.iter().find(|p| p.issue == "timeout").unwrap();
    assert!(!p.recurring);
    assert_eq!(p.trend, Trend::New);
    assert!(config.patterns_path().exists());

    fail(&store, "search", "timeout");
    let second = analyzer.analyze(7).unwrap();
    let p = second.iter().find(|p| p.issue == "timeout").unwrap();
    assert!(p.recurring);
    assert_eq!(p.trend, Trend::Increasing);

    let third = analyzer.analyze(7).unwrap();
    let p = third.iter().find(|p| p.issue == "timeout").unwrap();
    assert!(p.recurring);
    assert_eq!(p.trend, Trend::Stable);
}

#[test]
fn test_corrupt_snapshot_is_no_prior_state() {
    let (_dir, config, store, analyzer) = setup();
    fail(&store, "search", "timeout");
    fail(&store, "search", "timeout");
    fs::create_dir_all(&config.data_dir).unwrap();
    fs::write(config.patterns_path(), "garbage").unwrap();

    let patterns = analyzer.analyze(7).unwrap();
    assert!(patterns.iter().all(|p| !p.recurring));
    // overwritten with a valid snapshot
    let text = fs::read_to_string(config.patterns_path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(doc["patterns"].is_array());
}

#[test]
fn test_correlation_requires_two_sources() {
    let (_dir, _config, store, analyzer) = setup();
    store
        .record_simple(SimpleOutcome::new("chat").failed().error("session reset").source("gateway"))
        .unwrap();
    store
        .record_simple(
            SimpleOutcome::new("chat").failed().error("context length exceeded").source("gateway"),
        )
        .unwrap();
    assert!(analyzer.cross_source_correlations(7).unwrap().is_empty());

    store
        .record_simple(
            SimpleOutcome::new("plan").failed().error("context window too long").source("planner"),
        )
        .unwrap();
    let correlations = analyzer.cross_source_correlations(7).unwrap();
    assert_eq!(correlations.len(), 1);
    assert_eq!(correlations[0].correlation, "context_management");
    assert_eq!(correlations[0].sources, vec!["gateway".to_string(), "planner".to_string()]);
}

#[test]
fn test_health_after_mixed_outcomes() {
    let (_dir, _config, store, analyzer) = setup();
    store.record_simple(SimpleOutcome::new("t").quality(5)).unwrap();
    fail(&store, "t", "timeout");
    // (1/2) * ((5 + 2) / 2 / 5)
    assert_eq!(analyzer.health_score(7).unwrap(), 0.35);
}

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

#[test]
fn test_window_beyond_date_range_covers_everything() {
    let (_dir, config, store, analyzer) = setup();
    let old = (Utc::now() - Duration::days(3650)).to_rfc3339();
    let line = format!(
        r#"{{"ts": "{old}", "task_type": "api", "success": false, "issues": ["rate_limit"]}}"#
    );
    append_raw(&config, &line);
    fail(&store, "api", "429 rate limit");
    for days in [100_000_000, u32::MAX] {
        assert_eq!(store.load(days).unwrap().len(), 2);
        let patterns = analyzer.analyze(days).unwrap();
        assert_eq!(patterns.iter().find(|p| p.issue == "rate_limit").unwrap().frequency, 2);
        assert!(analyzer.health_score(days).unwrap() < 1.0);
        assert!(analyzer.cross_source_correlations(days).unwrap().is_empty());
    }
}

#[test]
fn test_out_of_range_quality_on_disk_is_bounded() {
    let (_dir, config, _store, analyzer) = setup();
    for _ in 0..3 {
        append_raw(&config, r#"{"task_type": "t", "success": true, "quality": 9}"#);
    }
    assert_eq!(analyzer.health_score(7).unwrap(), 1.0);
    let patterns = analyzer.analyze(7).unwrap();
    assert!(!patterns.is_empty());
    assert!(patterns.iter().all(|p| p.impact_score >= 0.0));
}
