//! Observable indexing status and its state machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Phase of the indexing state machine
///
/// `idle → initializing → listing_files → indexing_file_content → indexing_commits_diffs →
/// completed → idle`, with `error` reachable from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexingPhase {
    Idle,
    Initializing,
    ListingFiles,
    IndexingFileContent,
    IndexingCommitsDiffs,
    Completed,
    Error,
}

impl IndexingPhase {
    /// A run is in flight
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            IndexingPhase::Idle | IndexingPhase::Completed | IndexingPhase::Error
        )
    }

    pub fn can_transition_to(&self, next: IndexingPhase) -> bool {
        use IndexingPhase::*;
        matches!(
            (self, next),
            (Idle | Completed | Error, Initializing)
                | (Initializing, ListingFiles)
                | (ListingFiles, IndexingFileContent)
                | (IndexingFileContent, IndexingCommitsDiffs)
                | (IndexingCommitsDiffs, Completed)
                | (Completed, Idle)
                | (_, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingPhase::Idle => "idle",
            IndexingPhase::Initializing => "initializing",
            IndexingPhase::ListingFiles => "listing_files",
            IndexingPhase::IndexingFileContent => "indexing_file_content",
            IndexingPhase::IndexingCommitsDiffs => "indexing_commits_diffs",
            IndexingPhase::Completed => "completed",
            IndexingPhase::Error => "error",
        }
    }
}

/// Snapshot of the current or last indexing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexingStatus {
    pub phase: IndexingPhase,
    pub repo_path: Option<String>,
    pub files_processed: usize,
    pub files_total: usize,
    /// Files skipped because their content hash was unchanged
    pub files_skipped: usize,
    pub commits_processed: usize,
    pub commits_total: usize,
    /// Isolated per-file or per-commit failures in this run
    pub errors: usize,
    pub last_error: Option<String>,
    /// RFC 3339
    pub started_at: Option<String>,
    /// RFC 3339
    pub finished_at: Option<String>,
}

impl Default for IndexingStatus {
    fn default() -> Self {
        Self {
            phase: IndexingPhase::Idle,
            repo_path: None,
            files_processed: 0,
            files_total: 0,
            files_skipped: 0,
            commits_processed: 0,
            commits_total: 0,
            errors: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Process-wide owner of the indexing status
///
/// Readers get snapshots; only the indexing pipeline mutates it. Critical sections are
/// short and never span an await.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    inner: Arc<RwLock<IndexingStatus>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexingStatus> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexingStatus> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> IndexingStatus {
        self.read().clone()
    }

    /// Atomically admit a new run unless one is active.
    ///
    /// On admission the counters reset and the phase becomes `initializing`; otherwise the
    /// current snapshot is returned.
    pub(crate) fn try_begin(&self, repo_path: &str) -> Result<(), IndexingStatus> {
        let mut status = self.write();
        if status.phase.is_active() {
            return Err(status.clone());
        }

        *status = IndexingStatus {
            phase: IndexingPhase::Initializing,
            repo_path: Some(repo_path.to_string()),
            started_at: Some(now_rfc3339()),
            ..Default::default()
        };
        tracing::info!("Indexing phase -> initializing ({})", repo_path);
        Ok(())
    }

    /// Move to `next`; invalid transitions are logged and ignored
    pub(crate) fn set_phase(&self, next: IndexingPhase) -> bool {
        let mut status = self.write();
        if !status.phase.can_transition_to(next) {
            tracing::warn!(
                "Ignoring invalid indexing transition {} -> {}",
                status.phase.as_str(),
                next.as_str()
            );
            return false;
        }
        status.phase = next;
        if matches!(next, IndexingPhase::Completed | IndexingPhase::Error) {
            status.finished_at = Some(now_rfc3339());
        }
        tracing::info!("Indexing phase -> {}", next.as_str());
        true
    }

    pub(crate) fn set_files_total(&self, total: usize) {
        self.write().files_total = total;
    }

    pub(crate) fn file_processed(&self, skipped: bool) {
        let mut status = self.write();
        status.files_processed += 1;
        if skipped {
            status.files_skipped += 1;
        }
    }

    pub(crate) fn set_commits_total(&self, total: usize) {
        self.write().commits_total = total;
    }

    pub(crate) fn commit_processed(&self) {
        self.write().commits_processed += 1;
    }

    /// Record an isolated failure without changing phase
    pub(crate) fn record_error(&self, message: impl Into<String>) {
        let mut status = self.write();
        status.errors += 1;
        status.last_error = Some(message.into());
    }

    /// Record a run-preventing failure and move to `error`
    pub(crate) fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("Indexing failed: {}", message);
        self.write().last_error = Some(message);
        self.set_phase(IndexingPhase::Error);
    }
}
