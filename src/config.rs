//! # Configuration
//!
//! Read-only settings for one pipeline instance: where state lives, how far
//! back analysis looks, and which fix categories may be applied without review.
//!
//! Every field has a default, so a TOML file only needs the keys it overrides:
//!
//! ```toml
//! data_dir = "/var/lib/rsi"
//! analysis_window_days = 14
//! safe_categories = ["retry_logic"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RsiError};

const OUTCOMES_FILE: &str = "outcomes.jsonl";
const PATTERNS_FILE: &str = "patterns.json";
const PROPOSALS_DIR: &str = "proposals";

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the outcome log, pattern snapshot and fix proposals.
    pub data_dir: PathBuf,
    /// Default look-back window for loading and analysis, in days.
    pub analysis_window_days: u32,
    /// Minimum occurrence count reported by `OutcomeStore::recurrences`.
    pub recurrence_threshold: usize,
    /// When false, fix proposals are written but never marked applied.
    pub auto_fix_enabled: bool,
    /// Fix categories that may be applied automatically.
    pub safe_categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./rsi_data"),
            analysis_window_days: 7,
            recurrence_threshold: 3,
            auto_fix_enabled: true,
            safe_categories: vec![
                "routing_config".to_string(),
                "threshold_tuning".to_string(),
                "retry_logic".to_string(),
            ],
        }
    }
}

impl Config {
    /// Default config rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s).map_err(|e| RsiError::Config {
            path: PathBuf::from("<inline>"),
            detail: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RsiError::io(path, e))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| RsiError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.analysis_window_days == 0 {
            return Err(RsiError::InvalidConfig(
                "analysis_window_days must be > 0".into(),
            ));
        }
        if self.recurrence_threshold == 0 {
            return Err(RsiError::InvalidConfig(
                "recurrence_threshold must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn outcomes_path(&self) -> PathBuf {
        self.data_dir.join(OUTCOMES_FILE)
    }

    pub fn patterns_path(&self) -> PathBuf {
        self.data_dir.join(PATTERNS_FILE)
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.data_dir.join(PROPOSALS_DIR)
    }

    /// Whether fixes of `category` may be applied without review.
    pub fn is_safe_category(&self, category: &str) -> bool {
        self.safe_categories.iter().any(|c| c == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.data_dir, PathBuf::from("./rsi_data"));
        assert_eq!(cfg.analysis_window_days, 7);
        assert_eq!(cfg.recurrence_threshold, 3);
        assert!(cfg.auto_fix_enabled);
        assert_eq!(cfg.safe_categories.len(), 3);
    }

    #[test]
    fn test_derived_paths() {
        let cfg = Config::with_data_dir("/tmp/rsi");
        assert_eq!(cfg.outcomes_path(), PathBuf::from("/tmp/rsi/outcomes.jsonl"));
        assert_eq!(cfg.patterns_path(), PathBuf::from("/tmp/rsi/patterns.json"));
        assert_eq!(cfg.proposals_dir(), PathBuf::from("/tmp/rsi/proposals"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str("analysis_window_days = 14\n").unwrap();
        assert_eq!(cfg.analysis_window_days, 14);
        assert_eq!(cfg.recurrence_threshold, 3);
        assert!(cfg.is_safe_category("retry_logic"));
    }

    #[test]
    fn test_toml_overrides_safe_categories() {
        let cfg = Config::from_toml_str(
            "data_dir = \"/data\"\nsafe_categories = [\"retry_logic\"]\nauto_fix_enabled = false\n",
        )
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/data"));
        assert!(cfg.is_safe_category("retry_logic"));
        assert!(!cfg.is_safe_category("routing_config"));
        assert!(!cfg.auto_fix_enabled);
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = Config::from_toml_str("analysis_window_days = 0\n").unwrap_err();
        assert!(matches!(err, RsiError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_recurrence_threshold_rejected() {
        let cfg = Config { recurrence_threshold: 0, ..Config::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Config::from_toml_str("analysis_window_days = \"seven\"").unwrap_err();
        assert!(matches!(err, RsiError::Config { .. }));
    }

    #[test]
    fn test_from_toml_file_missing_is_io_error() {
        let err = Config::from_toml_file("/nonexistent/rsi/config.toml").unwrap_err();
        assert!(matches!(err, RsiError::Io { .. }));
    }
}
