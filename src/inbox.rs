//! File-drop ingestion.
//!
//! Any agent that can write a file can report outcomes: drop a JSON document
//! such as `{"task": "search", "success": false, "error": "timeout after 30s"}`
//! into the watch directory and the next [`Inbox::poll`] records it and moves
//! it to `.processed/`. Files that fail to parse stay where they are.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, RsiError};
use crate::observe::{Outcome, OutcomeStore};

const PROCESSED_DIR: &str = ".processed";

/// A watched directory of outcome JSON files.
#[derive(Debug, Clone)]
pub struct Inbox {
    watch_dir: PathBuf,
}

impl Inbox {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self { watch_dir: watch_dir.into() }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.watch_dir.join(PROCESSED_DIR)
    }

    /// Record every pending `*.json` file into `store`, in file-name order.
    ///
    /// Returns the outcomes as recorded. A missing watch directory yields none.
    pub fn poll(&self, store: &OutcomeStore) -> Result<Vec<Outcome>> {
        let entries = match fs::read_dir(&self.watch_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RsiError::io(&self.watch_dir, e)),
        };
        let mut pending: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
            })
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        pending.sort();

        let processed = self.processed_dir();
        fs::create_dir_all(&processed).map_err(|e| RsiError::io(&processed, e))?;

        let mut recorded = Vec::new();
        for path in pending {
            let outcome = match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|t| serde_json::from_str::<Outcome>(&t).map_err(|e| e.to_string()))
            {
                Ok(o) => o,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable inbox file");
                    continue;
                }
            };
            recorded.push(store.record(outcome)?);

            if let Some(name) = path.file_name() {
                let dest = processed.join(name);
                if let Err(e) = fs::rename(&path, &dest) {
                    warn!(path = %path.display(), error = %e, "could not move ingested file");
                }
            }
        }
        debug!(dir = %self.watch_dir.display(), count = recorded.len(), "inbox polled");
        Ok(recorded)
    }
}
