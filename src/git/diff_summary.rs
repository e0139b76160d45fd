use super::walker::{GitWalker, validate_repository};
use crate::error::GitError;
use std::path::Path;
use std::time::Duration;

pub const NO_REPOSITORY: &str = "No Git repository found";
pub const NO_PREVIOUS_COMMITS: &str = "No previous commits to compare";
pub const TRUNCATION_MARKER: &str = "\n\n[... diff truncated ...]";

/// Text diff between the two most recent commits, produced by the `git` binary.
///
/// Never fails: every problem is reported as a diagnostic string and logged.
pub async fn diff_summary(repo_path: &Path, timeout: Duration, max_chars: usize) -> String {
    let path = repo_path.to_path_buf();
    let latest = tokio::task::spawn_blocking(move || latest_two_commits(&path)).await;

    let (older, newer) = match latest {
        Ok(Ok(Some(pair))) => pair,
        Ok(Ok(None)) => return NO_PREVIOUS_COMMITS.to_string(),
        Ok(Err(DiffTarget::NoRepository)) => return NO_REPOSITORY.to_string(),
        Ok(Err(DiffTarget::Failed(e))) => {
            tracing::warn!("Failed to read history for diff summary: {}", e);
            return format!("Unable to compute diff: {}", e);
        }
        Err(e) => {
            tracing::error!("Diff summary task failed: {}", e);
            return format!("Unable to compute diff: {}", e);
        }
    };

    match run_git_diff(repo_path, &older, &newer, timeout).await {
        Ok(text) if text.trim().is_empty() => {
            "No changes between the last two commits".to_string()
        }
        Ok(text) => truncate_diff(&text, max_chars),
        Err(e) => {
            tracing::warn!("{}", e);
            format!("Unable to compute diff: {}", e)
        }
    }
}

enum DiffTarget {
    NoRepository,
    Failed(GitError),
}

fn latest_two_commits(path: &Path) -> Result<Option<(String, String)>, DiffTarget> {
    if !validate_repository(path) {
        return Err(DiffTarget::NoRepository);
    }
    let walker = GitWalker::open(path).map_err(DiffTarget::Failed)?;
    let history = walker.commit_history(2).map_err(DiffTarget::Failed)?;
    match history.as_slice() {
        [newer, older] => Ok(Some((older.oid.clone(), newer.oid.clone()))),
        _ => Ok(None),
    }
}

async fn run_git_diff(
    repo_path: &Path,
    older: &str,
    newer: &str,
    timeout: Duration,
) -> Result<String, GitError> {
    let command = format!("diff {} {}", older, newer);
    let child = tokio::process::Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args(["diff", older, newer])
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(GitError::CommandFailed {
                command,
                exit_code: None,
                stderr: e.to_string(),
            });
        }
        Err(_) => {
            return Err(GitError::CommandTimedOut {
                command,
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Cut `text` to `max_chars` characters and append the truncation marker when it is longer
pub fn truncate_diff(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..byte_idx]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text.to_string(),
    }
}
