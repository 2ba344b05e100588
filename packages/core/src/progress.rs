//! Progress of check runs.
//!
//! The runner reports through [`CheckProgress`]: once when a check knows
//! how many items it will evaluate, once per evaluated item with the flags
//! that item produced, and once with the finished [`CheckReport`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::runner::CheckReport;

/// Receives progress from a running check.
///
/// Implementations must be `Send + Sync`; the parallel runner reports
/// evaluated items from many worker threads at once.
pub trait CheckProgress: Send + Sync {
    /// The check `check` is about to evaluate `items` features and
    /// relations.
    fn started(&self, check: &str, items: u64);

    /// One item was evaluated and produced `flags` flags.
    fn evaluated(&self, flags: usize);

    /// The check is done.
    fn finished(&self, report: &CheckReport);
}

/// Ignores all progress.
pub struct NullProgress;

impl CheckProgress for NullProgress {
    fn started(&self, _check: &str, _items: u64) {}
    fn evaluated(&self, _flags: usize) {}
    fn finished(&self, _report: &CheckReport) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn CheckProgress> {
    Arc::new(NullProgress)
}

/// Counts what a run reported.
#[derive(Debug, Default)]
pub struct ProgressTally {
    pub items: AtomicU64,
    pub evaluated: AtomicU64,
    pub flags: AtomicUsize,
    pub finished: AtomicUsize,
}

impl ProgressTally {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckProgress for ProgressTally {
    fn started(&self, _check: &str, items: u64) {
        self.items.fetch_add(items, Ordering::Relaxed);
    }

    fn evaluated(&self, flags: usize) {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        self.flags.fetch_add(flags, Ordering::Relaxed);
    }

    fn finished(&self, _report: &CheckReport) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }
}
