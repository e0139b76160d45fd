use crate::error::GitError;
use crate::types::ChangeType;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{DiffOptions, ObjectType, Oid, Patch, Repository, Sort, Tree, TreeWalkMode, TreeWalkResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

const MODE_LINK: i32 = 0o120000;
const MODE_SUBMODULE: i32 = 0o160000;

/// Metadata of one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Full commit SHA (40 hex characters)
    pub oid: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Commit time, ISO-8601 with the committer's offset
    pub date: String,
    pub parent_oids: Vec<String>,
    pub tree_oid: String,
}

/// A path touched by a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
}

/// Unified patch text for one changed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub change_type: ChangeType,
    pub patch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Blob,
    Link,
    Submodule,
}

impl EntryKind {
    fn from_mode(mode: i32) -> Self {
        match mode {
            MODE_LINK => EntryKind::Link,
            MODE_SUBMODULE => EntryKind::Submodule,
            _ => EntryKind::Blob,
        }
    }
}

type TreeEntries = BTreeMap<String, (Oid, EntryKind)>;

/// True iff `path/.git` is accessible and HEAD resolves to a commit. Never fails.
pub fn validate_repository(path: &Path) -> bool {
    if !path.join(".git").exists() {
        return false;
    }
    match Repository::open(path) {
        Ok(repo) => repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .is_some(),
        Err(e) => {
            tracing::debug!("Failed to open repository at {}: {}", path.display(), e);
            false
        }
    }
}

/// Read-only view of a repository's HEAD, history and per-commit changes
pub struct GitWalker {
    repo: Repository,
    repo_path: PathBuf,
}

impl GitWalker {
    /// Open the repository rooted at `path` (no upward discovery)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let repo_path = path.as_ref().to_path_buf();
        if !repo_path.join(".git").exists() {
            return Err(GitError::RepoNotFound(repo_path.display().to_string()));
        }

        let repo = Repository::open(&repo_path).map_err(|e| GitError::OpenFailed(e.to_string()))?;

        tracing::debug!("Opened git repository at: {}", repo_path.display());
        Ok(Self { repo, repo_path })
    }

    /// Get the repository root path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn head_tree(&self) -> Result<Tree<'_>, GitError> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitError::HeadNotFound(e.to_string()))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| GitError::HeadNotFound(e.to_string()))?;
        commit
            .tree()
            .map_err(|e| GitError::TreeReadFailed(e.to_string()))
    }

    fn find_commit(&self, oid: &str) -> Result<git2::Commit<'_>, GitError> {
        let oid = Oid::from_str(oid).map_err(|e| GitError::IterFailed(e.to_string()))?;
        self.repo
            .find_commit(oid)
            .map_err(|e| GitError::IterFailed(e.to_string()))
    }

    /// All regular files (blobs) tracked at HEAD, in path order
    pub fn list_tracked_files(&self) -> Result<Vec<String>, GitError> {
        let tree = self.head_tree()?;
        let files = collect_tree(&tree)?
            .into_iter()
            .filter(|(_, (_, kind))| *kind == EntryKind::Blob)
            .map(|(path, _)| path)
            .collect::<Vec<_>>();

        tracing::debug!("HEAD tracks {} files", files.len());
        Ok(files)
    }

    /// Up to `count` most recent commits reachable from HEAD, newest first
    pub fn commit_history(&self, count: usize) -> Result<Vec<CommitRecord>, GitError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| GitError::IterFailed(e.to_string()))?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(|e| GitError::IterFailed(e.to_string()))?;
        revwalk
            .push_head()
            .map_err(|e| GitError::HeadNotFound(e.to_string()))?;

        let mut commits = Vec::new();
        for oid in revwalk.take(count) {
            let oid = oid.map_err(|e| GitError::IterFailed(e.to_string()))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| GitError::IterFailed(e.to_string()))?;
            commits.push(commit_record(&commit));
        }

        tracing::debug!("Read {} commits of history", commits.len());
        Ok(commits)
    }

    /// Paths added, modified, deleted or retyped by a commit relative to its first parent.
    /// A root commit reports every entry as added.
    pub fn changed_files(&self, commit_oid: &str) -> Result<Vec<FileChange>, GitError> {
        let commit = self.find_commit(commit_oid)?;
        let new_tree = commit
            .tree()
            .map_err(|e| GitError::TreeReadFailed(e.to_string()))?;
        let new_entries = collect_tree(&new_tree)?;

        let old_entries = if commit.parent_count() > 0 {
            let parent = commit
                .parent(0)
                .map_err(|e| GitError::IterFailed(e.to_string()))?;
            let tree = parent
                .tree()
                .map_err(|e| GitError::TreeReadFailed(e.to_string()))?;
            collect_tree(&tree)?
        } else {
            TreeEntries::new()
        };

        Ok(compare_entries(&old_entries, &new_entries))
    }

    /// Unified patch text for each change of a commit, in the order of `changes`
    pub fn file_diffs(
        &self,
        commit_oid: &str,
        changes: &[FileChange],
    ) -> Result<Vec<FileDiff>, GitError> {
        let commit = self.find_commit(commit_oid)?;
        let tree = commit
            .tree()
            .map_err(|e| GitError::TreeReadFailed(e.to_string()))?;
        let parent_tree = if commit.parent_count() > 0 {
            let parent = commit
                .parent(0)
                .map_err(|e| GitError::IterFailed(e.to_string()))?;
            Some(
                parent
                    .tree()
                    .map_err(|e| GitError::TreeReadFailed(e.to_string()))?,
            )
        } else {
            None
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts
            .context_lines(3)
            .include_typechange(true)
            .ignore_whitespace(false);

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))
            .map_err(|e| GitError::TreeReadFailed(e.to_string()))?;

        let mut patches: HashMap<String, String> = HashMap::new();
        for idx in 0..diff.deltas().len() {
            let Some(delta) = diff.get_delta(idx) else {
                continue;
            };
            let Some(path) = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
            else {
                continue;
            };

            match Patch::from_diff(&diff, idx) {
                Ok(Some(mut patch)) => match patch.to_buf() {
                    Ok(buf) => {
                        patches.insert(path, String::from_utf8_lossy(&buf).into_owned());
                    }
                    Err(e) => tracing::debug!("Failed to render patch for {}: {}", path, e),
                },
                Ok(None) => {}
                Err(e) => tracing::debug!("Failed to build patch for {}: {}", path, e),
            }
        }

        Ok(changes
            .iter()
            .map(|change| FileDiff {
                path: change.path.clone(),
                change_type: change.change_type,
                patch: patches.remove(&change.path).unwrap_or_else(|| {
                    format!("Binary files a/{0} and b/{0} differ\n", change.path)
                }),
            })
            .collect())
    }
}

fn commit_record(commit: &git2::Commit<'_>) -> CommitRecord {
    let author = commit.author();
    CommitRecord {
        oid: commit.id().to_string(),
        message: commit.message().unwrap_or("").to_string(),
        author_name: author.name().unwrap_or("Unknown").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        date: iso_date(commit.time()),
        parent_oids: commit.parent_ids().map(|id| id.to_string()).collect(),
        tree_oid: commit.tree_id().to_string(),
    }
}

/// Format a git timestamp as RFC 3339 in its recorded offset
pub(crate) fn iso_date(time: git2::Time) -> String {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .map(|dt| dt.with_timezone(&offset).to_rfc3339())
        .unwrap_or_default()
}

fn collect_tree(tree: &Tree<'_>) -> Result<TreeEntries, GitError> {
    let mut entries = TreeEntries::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() != Some(ObjectType::Tree)
            && let Some(name) = entry.name()
        {
            entries.insert(
                format!("{}{}", root, name),
                (entry.id(), EntryKind::from_mode(entry.filemode())),
            );
        }
        TreeWalkResult::Ok
    })
    .map_err(|e| GitError::TreeReadFailed(e.to_string()))?;
    Ok(entries)
}

fn compare_entries(old: &TreeEntries, new: &TreeEntries) -> Vec<FileChange> {
    let mut changes = Vec::new();

    for (path, (new_oid, new_kind)) in new {
        let change_type = match old.get(path) {
            None => Some(ChangeType::Add),
            Some((_, old_kind)) if old_kind != new_kind => Some(ChangeType::Typechange),
            Some((old_oid, _)) if old_oid != new_oid => Some(ChangeType::Modify),
            Some(_) => None,
        };
        if let Some(change_type) = change_type {
            changes.push(FileChange {
                path: path.clone(),
                change_type,
            });
        }
    }

    for path in old.keys() {
        if !new.contains_key(path) {
            changes.push(FileChange {
                path: path.clone(),
                change_type: ChangeType::Delete,
            });
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}
