//! Single-flight guard for indexing runs
//!
//! At most one run is active per [`StatusTracker`]. Admission is an atomic check-and-set on
//! the status phase, so a second trigger observes the in-flight status instead of starting.

use crate::error::IndexingError;
use crate::status::{IndexingPhase, IndexingStatus, StatusTracker};

/// Result of trying to start an indexing run
pub(crate) enum IndexLockResult {
    /// We own the run and must drive it to `completed` or `error`
    Acquired(IndexLockGuard),
    /// Another run is active; this is its current status
    AlreadyRunning(IndexingStatus),
}

/// Guard held for the lifetime of one indexing run
///
/// Finishing the run consumes the guard. A guard dropped without finishing (panic or early
/// return) moves the status to `error` so the next trigger is admitted.
pub(crate) struct IndexLockGuard {
    tracker: StatusTracker,
    /// Set once the run reached a terminal phase
    released: bool,
}

impl IndexLockGuard {
    pub(crate) fn acquire(tracker: &StatusTracker, repo_path: &str) -> IndexLockResult {
        match tracker.try_begin(repo_path) {
            Ok(()) => IndexLockResult::Acquired(Self {
                tracker: tracker.clone(),
                released: false,
            }),
            Err(current) => {
                tracing::info!(
                    "Indexing already in progress ({}), not starting another run",
                    current.phase.as_str()
                );
                IndexLockResult::AlreadyRunning(current)
            }
        }
    }

    pub(crate) fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// `completed`, then back to `idle`
    pub(crate) fn complete(mut self) -> IndexingStatus {
        self.tracker.set_phase(IndexingPhase::Completed);
        let snapshot = self.tracker.snapshot();
        self.tracker.set_phase(IndexingPhase::Idle);
        self.released = true;
        snapshot
    }

    pub(crate) fn fail(mut self, message: impl Into<String>) -> IndexingStatus {
        self.tracker.fail(message);
        self.released = true;
        self.tracker.snapshot()
    }
}

impl Drop for IndexLockGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Indexing guard dropped before the run finished");
            self.tracker.fail(IndexingError::Interrupted.to_string());
        }
    }
}
