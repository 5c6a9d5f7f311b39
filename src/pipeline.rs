//! # Self-Improvement Loop
//!
//! Wires the stages into one observe → analyze → fix cycle and optionally runs
//! it periodically in the background:
//!
//! ```text
//! adapters ──► OutcomeStore ──► Analyzer ──► Fixer
//!                   │               │
//!                   └──► health / correlations
//! ```
//!
//! ## Background task
//!
//! At most one periodic task runs per [`RsiLoop`]. The handle (cancellation
//! token + join handle) is owned by the instance, not by global state. The loop
//! runs a cycle immediately, then sleeps for the interval or until cancelled,
//! so a stop request never waits out a full interval.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rsi_loop::{Config, RsiLoop, SimpleOutcome};
//! use std::time::Duration;
//!
//! let rsi = RsiLoop::new(Config::default());
//! rsi.store().record_simple(SimpleOutcome::new("code_gen").model("sonnet"))?;
//! let patterns = rsi.run_cycle()?;
//!
//! rsi.start_background(Duration::from_secs(3600))?;
//! // ...
//! rsi.stop_background().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analyze::pattern::unmapped_issues;
use crate::analyze::{Analyzer, Correlation, Pattern};
use crate::config::Config;
use crate::error::{Result, RsiError};
use crate::fix::{Fix, Fixer};
use crate::observe::OutcomeStore;

/// How long `stop_background` waits for an in-flight cycle.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Pipeline: the shareable stage set
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Pipeline {
    config: Config,
    store: OutcomeStore,
    analyzer: Analyzer,
    fixer: Fixer,
}

impl Pipeline {
    fn run_cycle(&self) -> Result<Vec<Pattern>> {
        let patterns = self.analyzer.analyze(self.config.analysis_window_days)?;
        for pattern in &patterns {
            self.fixer.propose_and_apply(pattern)?;
        }
        Ok(patterns)
    }
}

struct BackgroundTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// RsiLoop
// ---------------------------------------------------------------------------

/// The observe → analyze → fix loop.
pub struct RsiLoop {
    inner: Arc<Pipeline>,
    background: Mutex<Option<BackgroundTask>>,
}

impl RsiLoop {
    pub fn new(config: Config) -> Self {
        let unmapped = unmapped_issues();
        if !unmapped.is_empty() {
            warn!(issues = ?unmapped, "issue tags without a category will report as 'other'");
        }

        let store = OutcomeStore::new(&config);
        let analyzer = Analyzer::with_store(store.clone(), &config);
        let fixer = Fixer::new(&config);
        Self {
            inner: Arc::new(Pipeline { config, store, analyzer, fixer }),
            background: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &OutcomeStore {
        &self.inner.store
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.inner.analyzer
    }

    pub fn fixer(&self) -> &Fixer {
        &self.inner.fixer
    }

    /// Analyze the configured window and propose a fix for every pattern.
    pub fn run_cycle(&self) -> Result<Vec<Pattern>> {
        self.inner.run_cycle()
    }

    /// Analyze without proposing fixes.
    pub fn patterns(&self) -> Result<Vec<Pattern>> {
        self.inner.analyzer.analyze(self.inner.config.analysis_window_days)
    }

    pub fn health_score(&self) -> Result<f64> {
        self.inner.analyzer.health_score(self.inner.config.analysis_window_days)
    }

    pub fn correlations(&self) -> Result<Vec<Correlation>> {
        self.inner
            .analyzer
            .cross_source_correlations(self.inner.config.analysis_window_days)
    }

    /// All saved fix proposals.
    pub fn fixes(&self) -> Result<Vec<Fix>> {
        self.inner.fixer.load_proposals()
    }

    // -----------------------------------------------------------------------
    // Background task
    // -----------------------------------------------------------------------

    /// Spawn the periodic cycle loop on the current tokio runtime.
    ///
    /// Returns `Ok(false)` without spawning when a loop is already running.
    /// Fails only when called outside a tokio runtime.
    pub fn start_background(&self, interval: Duration) -> Result<bool> {
        let mut slot = self.background_slot();
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("background loop already running");
            return Ok(false);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RsiError::Background(e.to_string()))?;

        let shutdown = CancellationToken::new();
        let handle = runtime.spawn(cycle_loop(
            Arc::clone(&self.inner),
            interval,
            shutdown.clone(),
        ));
        *slot = Some(BackgroundTask { shutdown, handle });
        Ok(true)
    }

    /// Signal the loop to stop and wait up to [`STOP_TIMEOUT`] for it.
    ///
    /// No-op when nothing is running.
    pub async fn stop_background(&self) {
        let Some(task) = self.background_slot().take() else {
            return;
        };
        task.shutdown.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, task.handle).await {
            Ok(Ok(())) => debug!("background loop joined"),
            Ok(Err(e)) => warn!(error = %e, "background loop ended abnormally"),
            Err(_) => warn!(
                timeout_secs = STOP_TIMEOUT.as_secs(),
                "background loop still finishing a cycle, detaching"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.background_slot()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    fn background_slot(&self) -> MutexGuard<'_, Option<BackgroundTask>> {
        self.background.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RsiLoop {
    fn drop(&mut self) {
        if let Some(task) = self.background_slot().as_ref() {
            task.shutdown.cancel();
        }
    }
}

async fn cycle_loop(pipeline: Arc<Pipeline>, interval: Duration, shutdown: CancellationToken) {
    info!(
        target: "rsi_loop::pipeline",
        interval_secs = interval.as_secs(),
        "background cycle loop started"
    );

    loop {
        let p = Arc::clone(&pipeline);
        match tokio::task::spawn_blocking(move || p.run_cycle()).await {
            Ok(Ok(patterns)) => info!(
                target: "rsi_loop::pipeline",
                patterns = patterns.len(),
                recurring = patterns.iter().filter(|p| p.recurring).count(),
                "cycle complete"
            ),
            Ok(Err(e)) => warn!(
                target: "rsi_loop::pipeline",
                error = %e,
                "cycle failed, will retry next interval"
            ),
            Err(e) => error!(
                target: "rsi_loop::pipeline",
                error = %e,
                "cycle task panicked"
            ),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(target: "rsi_loop::pipeline", "background cycle loop stopped");
}
