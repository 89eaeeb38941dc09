//! Progress reporting trait for the pipeline stages.
//!
//! Decouples stage-level progress from any rendering backend. The CLI
//! provides an `indicatif` implementation; tests and headless callers use
//! [`NullProgress`].

use std::sync::Arc;

/// Trait for reporting progress from a running pipeline.
///
/// Implementations must be `Send + Sync` so one reporter can be shared
/// across the run.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of pipeline stages.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` stages.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark the run complete with a final message.
    fn finish(&self, msg: String);
}

/// A no-op [`ProgressCallback`] that silently ignores all updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
