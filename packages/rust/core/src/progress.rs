//! Batch outcome and progress reporting shared by the stage workers.

use serde::Serialize;

/// `(success, error)` counts for one stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub stage: String,
    /// Candidate records selected for the run.
    pub selected: u64,
    pub success: u64,
    pub errors: u64,
}

impl BatchSummary {
    pub fn new(stage: &str, selected: u64) -> Self {
        Self {
            stage: stage.to_string(),
            selected,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Progress callback for long-running stages.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts with its candidate count.
    fn stage(&self, name: &str, total: u64);
    /// Called before each record is processed.
    fn item(&self, identifier: &str, current: u64, total: u64);
    /// Called when the stage completes.
    fn done(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _name: &str, _total: u64) {}
    fn item(&self, _identifier: &str, _current: u64, _total: u64) {}
    fn done(&self, _summary: &BatchSummary) {}
}

/// Percentage helper: 0 when the denominator is 0.
pub(crate) fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
