//! Crate-level error type.
//!
//! Only storage, configuration and listener failures surface as [`RsiError`]. Malformed
//! persisted data (a corrupt outcome line, an unreadable pattern snapshot) is
//! skipped where it is read and never reaches the caller.

use std::path::PathBuf;

/// Errors returned by the rsi-loop public API.
#[derive(Debug, thiserror::Error)]
pub enum RsiError {
    /// A file or directory under the data dir could not be created, read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialized for persistence.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A configuration file could not be read or parsed.
    #[error("config error in {path}: {detail}")]
    Config { path: PathBuf, detail: String },

    /// Configuration values failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The background cycle loop could not be started.
    #[error("background loop: {0}")]
    Background(String),

    /// The webhook listener could not bind or stopped accepting.
    #[error("webhook server on {addr}: {source}")]
    Server {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl RsiError {
    /// Wrap an `std::io::Error` with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RsiError::Io { path: path.into(), source }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RsiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let e = RsiError::io(
            "/tmp/rsi/outcomes.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = e.to_string();
        assert!(msg.contains("/tmp/rsi/outcomes.jsonl"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_invalid_config_display() {
        let e = RsiError::InvalidConfig("analysis_window_days must be > 0".into());
        assert_eq!(e.to_string(), "invalid config: analysis_window_days must be > 0");
    }

    #[test]
    fn test_serialize_from_serde_json() {
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: RsiError = bad.into();
        assert!(matches!(e, RsiError::Serialize(_)));
    }
}
