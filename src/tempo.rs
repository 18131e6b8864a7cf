use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Process-wide beat period and loudness, as last reported by the audio
/// analyzer. Last write wins; readers see whatever is current when they read.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TempoState {
    pub beat_ms: f64,
    pub volume: f64,
}

impl TempoState {
    pub fn bpm(&self) -> f64 {
        (60_000.0 / self.beat_ms).round()
    }
}

impl Default for TempoState {
    fn default() -> Self {
        Self { beat_ms: 100.0, volume: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TempoReport {
    pub ms: Option<f64>,
    pub rms: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied,
    Ignored,
}

pub struct Tempo {
    state: RwLock<TempoState>,
    analyzer: AtomicBool,
}

impl Tempo {
    pub fn new(state: TempoState, analyzer: bool) -> Self {
        Self { state: RwLock::new(state), analyzer: AtomicBool::new(analyzer) }
    }

    pub fn get(&self) -> TempoState {
        *self.state.read()
    }

    pub fn analyzer_enabled(&self) -> bool {
        self.analyzer.load(Ordering::Acquire)
    }

    pub fn set_analyzer(&self, enabled: bool) {
        log::info!("analyzer {}", if enabled { "enabled" } else { "disabled" });
        self.analyzer.store(enabled, Ordering::Release);
    }

    /// Applies an analyzer report. Disabled analyzers only accept reports
    /// with `force` set. Zero or non-finite fields keep the previous value.
    pub fn report(&self, report: TempoReport, force: bool) -> ReportOutcome {
        if !self.analyzer_enabled() && !force {
            log::trace!("analyzer disabled, ignoring {:?}", report);
            return ReportOutcome::Ignored;
        }

        let mut state = self.state.write();
        if let Some(ms) = report.ms.filter(|ms| ms.is_finite() && *ms > 0.0) {
            state.beat_ms = ms;
        }
        if let Some(rms) = report.rms.filter(|rms| rms.is_finite() && *rms != 0.0) {
            state.volume = rms;
        }
        log::trace!("tempo: {:?}", *state);
        ReportOutcome::Applied
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(TempoState::default(), true)
    }
}
