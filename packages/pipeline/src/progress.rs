//! Progress reporting for the long-running pipeline phases.
//!
//! The pipeline reports through [`ProgressCallback`] and never renders
//! anything itself; binaries plug in progress bars, tests use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from one pipeline phase.
///
/// Shared across concurrent postal code lookups, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Units of work in the phase.
    fn set_total(&self, total: u64);

    /// Advance by `delta` units.
    fn inc(&self, delta: u64);

    /// What the phase is working on right now (a partition, a year).
    fn set_message(&self, msg: String);

    /// The phase is done; `msg` summarizes it.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// One callback per phase of a full run.
#[derive(Clone)]
pub struct RunProgress {
    /// Postal code resolution, one unit per distinct code.
    pub geocode: Arc<dyn ProgressCallback>,
    /// Spatial join, one unit per postal code and partition.
    pub join: Arc<dyn ProgressCallback>,
    /// Aggregation, one unit per partition summary and per year of
    /// weighted points.
    pub aggregate: Arc<dyn ProgressCallback>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            geocode: null_progress(),
            join: null_progress(),
            aggregate: null_progress(),
        }
    }
}
