use super::RagClient;
use super::index_lock::IndexLockGuard;
use crate::cache::content_hash;
use crate::error::{EmbeddingError, GitError, IndexingError, VectorDbError};
use crate::git::{CommitChunker, CommitRecord, FileChange, FileDiff, GitWalker, validate_repository};
use crate::status::{IndexingPhase, IndexingStatus, StatusTracker};
use crate::synchronizer::IndexSynchronizer;
use crate::types::{IndexPoint, IndexableUnit};
use anyhow::{Context, Result, anyhow};
use futures::{StreamExt, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What happened to one tracked file
enum FileOutcome {
    /// Chunks embedded and stored
    Indexed { hash: String },
    /// Same content hash as the last successful run
    Unchanged { hash: String },
    /// Not indexable as text; previously stored chunks get removed
    Skipped(String),
}

/// Commit history gathered on the blocking pool
type CommitBatch = Vec<(CommitRecord, Result<(Vec<FileChange>, Vec<FileDiff>), GitError>)>;

/// Drive one admitted run to `completed` or `error`
pub(crate) async fn do_index(
    client: &RagClient,
    guard: IndexLockGuard,
    repo_path: PathBuf,
) -> IndexingStatus {
    let start = Instant::now();

    match run_phases(client, guard.tracker(), &repo_path).await {
        Ok(()) => {
            let status = guard.complete();
            tracing::info!(
                "Indexed {} in {:?}: {}/{} files ({} unchanged), {}/{} commits, {} errors",
                repo_path.display(),
                start.elapsed(),
                status.files_processed,
                status.files_total,
                status.files_skipped,
                status.commits_processed,
                status.commits_total,
                status.errors
            );
            status
        }
        Err(e) => guard.fail(format!("{:#}", e)),
    }
}

async fn run_phases(client: &RagClient, tracker: &StatusTracker, repo_path: &Path) -> Result<()> {
    let path = repo_path.to_path_buf();
    let valid = tokio::task::spawn_blocking(move || validate_repository(&path))
        .await
        .context("Repository validation task failed")?;
    if !valid {
        return Err(IndexingError::InvalidRepository(repo_path.display().to_string()).into());
    }

    client
        .vector_db
        .initialize(client.embedder.dimension())
        .await
        .context("Failed to initialize vector store collection")?;
    let sync = client.synchronizer();

    tracker.set_phase(IndexingPhase::ListingFiles);
    let path = repo_path.to_path_buf();
    let files = tokio::task::spawn_blocking(move || {
        GitWalker::open(&path)?.list_tracked_files()
    })
    .await
    .context("File listing task failed")?
    .map_err(|e| IndexingError::ListFailed(e.to_string()))?;
    tracker.set_files_total(files.len());

    tracker.set_phase(IndexingPhase::IndexingFileContent);
    let indexed = index_files(client, tracker, &sync, repo_path, &files).await?;

    tracker.set_phase(IndexingPhase::IndexingCommitsDiffs);
    index_history(client, tracker, &sync, repo_path).await?;

    match sync.remove_for_deleted_files(&indexed).await {
        Ok(removed) if removed > 0 => tracing::info!("Removed {} stale file chunks", removed),
        Ok(_) => {}
        Err(e @ VectorDbError::ConnectionFailed(_)) => {
            return Err(anyhow::Error::new(e).context("Stale chunk cleanup failed"));
        }
        Err(e) => {
            tracing::warn!("Stale chunk cleanup failed: {}", e);
            tracker.record_error(format!("stale chunk cleanup: {}", e));
        }
    }

    Ok(())
}

/// True when the vector store itself could not be reached, after retries
fn store_unreachable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<VectorDbError>(),
            Some(VectorDbError::ConnectionFailed(_))
        )
    })
}

/// Index file content; returns the set of files that must keep their stored chunks
async fn index_files(
    client: &RagClient,
    tracker: &StatusTracker,
    sync: &IndexSynchronizer,
    repo_path: &Path,
    files: &[String],
) -> Result<HashSet<String>> {
    let skip_unchanged = client.config.indexing.skip_unchanged_files;
    let root = RagClient::normalize_path(repo_path)
        .unwrap_or_else(|_| repo_path.display().to_string());
    let previous: HashMap<String, String> = if skip_unchanged {
        let cache = client.hash_cache.read().await;
        cache.get_root(&root).cloned().unwrap_or_default()
    } else {
        HashMap::new()
    };

    let mut keep = HashSet::with_capacity(files.len());
    let mut hashes = HashMap::with_capacity(files.len());

    for file in files {
        match index_file(client, sync, repo_path, file, &previous).await {
            Ok(FileOutcome::Indexed { hash }) => {
                tracing::debug!("Indexed {}", file);
                keep.insert(file.clone());
                hashes.insert(file.clone(), hash);
                tracker.file_processed(false);
            }
            Ok(FileOutcome::Unchanged { hash }) => {
                tracing::debug!("Unchanged, skipping {}", file);
                keep.insert(file.clone());
                hashes.insert(file.clone(), hash);
                tracker.file_processed(true);
            }
            Ok(FileOutcome::Skipped(reason)) => {
                tracing::debug!("Not indexing {}: {}", file, reason);
                tracker.file_processed(false);
            }
            Err(e) if store_unreachable(&e) => {
                return Err(e.context(format!("Vector store lost while indexing {}", file)));
            }
            Err(e) => {
                // Stored chunks of a file that still exists are left in place
                tracing::warn!("Failed to index {}: {:#}", file, e);
                keep.insert(file.clone());
                tracker.record_error(format!("{}: {:#}", file, e));
                tracker.file_processed(false);
            }
        }
    }

    if skip_unchanged {
        let mut cache = client.hash_cache.write().await;
        cache.update_root(root, hashes);
        if let Err(e) = cache.save(&client.cache_path) {
            tracing::warn!("Failed to save hash cache: {}", e);
        }
    }

    Ok(keep)
}

async fn index_file(
    client: &RagClient,
    sync: &IndexSynchronizer,
    repo_path: &Path,
    file: &str,
    previous: &HashMap<String, String>,
) -> Result<FileOutcome> {
    if client.exclude.is_excluded(file) {
        return Ok(FileOutcome::Skipped("excluded by pattern".to_string()));
    }

    let abs = repo_path.join(file);
    let metadata = tokio::fs::metadata(&abs)
        .await
        .map_err(|e| IndexingError::FileReadFailed {
            file: file.to_string(),
            reason: e.to_string(),
        })?;
    if !metadata.is_file() {
        return Ok(FileOutcome::Skipped("not a regular file".to_string()));
    }

    let max = client.config.indexing.max_file_size;
    let size = metadata.len() as usize;
    if size > max {
        return Ok(FileOutcome::Skipped(
            IndexingError::FileTooLarge { size, max }.to_string(),
        ));
    }

    let bytes = tokio::fs::read(&abs)
        .await
        .map_err(|e| IndexingError::FileReadFailed {
            file: file.to_string(),
            reason: e.to_string(),
        })?;
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            return Ok(FileOutcome::Skipped(
                IndexingError::InvalidUtf8(file.to_string()).to_string(),
            ));
        }
    };
    if content.trim().is_empty() {
        return Ok(FileOutcome::Skipped("no text content".to_string()));
    }

    let hash = content_hash(&content);
    if previous.get(file) == Some(&hash) {
        return Ok(FileOutcome::Unchanged { hash });
    }

    let last_modified = metadata
        .modified()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
        .unwrap_or_default();

    let units: Vec<IndexableUnit> = client
        .chunker
        .chunk(&content)
        .into_iter()
        .map(|chunk| IndexableUnit::FileChunk {
            filepath: file.to_string(),
            chunk_index: chunk.index,
            total_chunks: chunk.total,
            content: chunk.content,
            last_modified: last_modified.clone(),
        })
        .collect();
    let total = units.len();

    let points = embed_units(client, units)
        .await
        .context("Failed to embed chunks")?;
    sync.upsert_batch(points)
        .await
        .context("Failed to store chunks")?;
    sync.remove_stale(file, total)
        .await
        .context("Failed to remove stale chunks")?;

    Ok(FileOutcome::Indexed { hash })
}

/// Embed every unit with bounded concurrency; one failure abandons the whole set
async fn embed_units(
    client: &RagClient,
    units: Vec<IndexableUnit>,
) -> Result<Vec<IndexPoint>, EmbeddingError> {
    let concurrency = client.config.indexing.embedding_concurrency.max(1);

    futures::stream::iter(units.into_iter().map(|unit| {
        let embedder = client.embedder.clone();
        async move {
            let vector = embedder.embed(&unit.embedding_text()).await?;
            Ok::<_, EmbeddingError>(IndexPoint::new(unit, vector))
        }
    }))
    .buffered(concurrency)
    .try_collect()
    .await
}

async fn index_history(
    client: &RagClient,
    tracker: &StatusTracker,
    sync: &IndexSynchronizer,
    repo_path: &Path,
) -> Result<()> {
    let depth = client.config.indexing.commit_history_depth;
    if depth == 0 {
        return Ok(());
    }

    let path = repo_path.to_path_buf();
    let history = tokio::task::spawn_blocking(move || -> Result<CommitBatch, GitError> {
        let walker = GitWalker::open(&path)?;
        let commits = walker.commit_history(depth)?;
        Ok(commits
            .into_iter()
            .map(|commit| {
                let changes = walker.changed_files(&commit.oid).and_then(|changes| {
                    let diffs = walker.file_diffs(&commit.oid, &changes)?;
                    Ok((changes, diffs))
                });
                (commit, changes)
            })
            .collect())
    })
    .await;

    let history = match history {
        Ok(Ok(history)) => history,
        Ok(Err(e)) => {
            tracing::warn!("Failed to read commit history: {}", e);
            tracker.record_error(format!("commit history: {}", e));
            return Ok(());
        }
        Err(e) => {
            tracing::warn!("Commit history task failed: {}", e);
            tracker.record_error(format!("commit history: {}", e));
            return Ok(());
        }
    };

    tracker.set_commits_total(history.len());
    let commit_chunker = CommitChunker::new(client.chunker);

    for (commit, changes) in history {
        let short = &commit.oid[..commit.oid.len().min(8)];
        let result = match changes {
            Ok((changes, diffs)) => {
                index_commit(client, sync, &commit_chunker, &commit, &changes, &diffs).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(points) => tracing::debug!("Indexed commit {} ({} points)", short, points),
            Err(e) if store_unreachable(&e) => {
                let context = format!("Vector store lost while indexing commit {}", short);
                return Err(e.context(context));
            }
            Err(e) => {
                tracing::warn!("Failed to index commit {}: {:#}", short, e);
                tracker.record_error(format!("commit {}: {:#}", short, e));
            }
        }
        tracker.commit_processed();
    }
    Ok(())
}

async fn index_commit(
    client: &RagClient,
    sync: &IndexSynchronizer,
    commit_chunker: &CommitChunker,
    commit: &CommitRecord,
    changes: &[FileChange],
    diffs: &[FileDiff],
) -> Result<usize> {
    // The commit and each file's diff embed independently; a failed group does not
    // discard the others.
    let mut groups = vec![(
        "commit".to_string(),
        vec![commit_chunker.commit_unit(commit, changes)],
    )];
    for diff in diffs {
        groups.push((
            format!("diff of {}", diff.path),
            commit_chunker.diff_units(&commit.oid, diff),
        ));
    }

    let mut stored = 0;
    let mut failed = Vec::new();
    for (label, units) in groups {
        match embed_units(client, units).await {
            Ok(points) => {
                stored += sync
                    .upsert_batch(points)
                    .await
                    .with_context(|| format!("Failed to store {}", label))?;
            }
            Err(e) => failed.push(format!("{}: {}", label, e)),
        }
    }

    if failed.is_empty() {
        Ok(stored)
    } else {
        Err(anyhow!(
            "Failed to embed {} ({} points stored)",
            failed.join("; "),
            stored
        ))
    }
}
