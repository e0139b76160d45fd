//! Git repository access for indexing
//!
//! Resolves HEAD, lists tracked files, walks commit history, classifies per-commit
//! changes and renders their diffs into indexable units.

/// Commit and diff conversion into indexable units
pub mod chunker;
/// Timeout-bounded `git diff` between the two most recent commits
pub mod diff_summary;
/// Repository reading via libgit2
pub mod walker;

pub use chunker::CommitChunker;
pub use diff_summary::diff_summary;
pub use walker::{CommitRecord, FileChange, FileDiff, GitWalker, validate_repository};
