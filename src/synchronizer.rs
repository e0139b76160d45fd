//! Keeps stored points consistent with repository state.
//!
//! Points are keyed by content-addressed ids, so writes are idempotent upserts. What an
//! upsert cannot fix (chunks past a file's new end, files that disappeared) is removed here
//! by scrolling the affected `file_chunk` points and deleting them by id.

use crate::config::VectorDbConfig;
use crate::error::VectorDbError;
use crate::retry::RetryPolicy;
use crate::types::{AdjacentChunks, DataType, IndexPoint, IndexableUnit, Neighbor};
use crate::vector_db::{PointFilter, VectorDatabase};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct IndexSynchronizer {
    db: Arc<dyn VectorDatabase>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl IndexSynchronizer {
    pub fn new(db: Arc<dyn VectorDatabase>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    pub fn from_config(db: Arc<dyn VectorDatabase>, config: &VectorDbConfig) -> Self {
        Self::new(
            db,
            config.upsert_batch_size,
            RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        )
    }

    /// Upsert in bounded batches, each retried; the first batch that keeps failing aborts
    pub async fn upsert_batch(&self, points: Vec<IndexPoint>) -> Result<usize, VectorDbError> {
        let mut written = 0;
        for batch in points.chunks(self.batch_size) {
            written += self
                .retry
                .run(|| self.db.upsert_points(batch.to_vec()))
                .await?;
        }
        Ok(written)
    }

    /// Delete `file_chunk` points of `filepath` with `chunk_index >= new_total`
    pub async fn remove_stale(
        &self,
        filepath: &str,
        new_total: usize,
    ) -> Result<usize, VectorDbError> {
        let filter = PointFilter::new()
            .data_type(DataType::FileChunk)
            .filepath(filepath);
        let stale: Vec<String> = self
            .retry
            .run(|| self.db.scroll(&filter))
            .await?
            .into_iter()
            .filter(|p| p.payload.chunk_index().is_some_and(|i| i >= new_total))
            .map(|p| p.id)
            .collect();

        if !stale.is_empty() {
            tracing::debug!(
                "Removing {} stale chunks of {} (now {} chunks)",
                stale.len(),
                filepath,
                new_total
            );
        }
        self.delete_ids(stale).await
    }

    /// Delete `file_chunk` points whose file is not in `current_files`
    pub async fn remove_for_deleted_files(
        &self,
        current_files: &HashSet<String>,
    ) -> Result<usize, VectorDbError> {
        let filter = PointFilter::new().data_type(DataType::FileChunk);
        let mut removed_files = HashSet::new();
        let stale: Vec<String> = self
            .retry
            .run(|| self.db.scroll(&filter))
            .await?
            .into_iter()
            .filter_map(|p| match &p.payload {
                IndexableUnit::FileChunk { filepath, .. } if !current_files.contains(filepath) => {
                    removed_files.insert(filepath.clone());
                    Some(p.id)
                }
                _ => None,
            })
            .collect();

        if !removed_files.is_empty() {
            tracing::info!(
                "Removing {} chunks of {} files no longer tracked",
                stale.len(),
                removed_files.len()
            );
        }
        self.delete_ids(stale).await
    }

    /// Neighbours of a file chunk; absent neighbours are reported, never an error
    pub async fn fetch_adjacent_chunks(
        &self,
        filepath: &str,
        chunk_index: usize,
    ) -> Result<AdjacentChunks, VectorDbError> {
        let previous = match chunk_index.checked_sub(1) {
            Some(prev) => self.neighbor(filepath, prev).await?,
            None => Neighbor::Missing {
                chunk_index: -1,
                reason: "start of file".to_string(),
            },
        };
        let next = self.neighbor(filepath, chunk_index + 1).await?;

        Ok(AdjacentChunks {
            filepath: filepath.to_string(),
            chunk_index,
            previous,
            next,
        })
    }

    async fn neighbor(&self, filepath: &str, index: usize) -> Result<Neighbor, VectorDbError> {
        let filter = PointFilter::new()
            .data_type(DataType::FileChunk)
            .filepath(filepath)
            .chunk_index(index);

        let found = self.db.scroll(&filter).await?.into_iter().next();
        Ok(match found.map(|p| p.payload) {
            Some(IndexableUnit::FileChunk {
                chunk_index,
                total_chunks,
                content,
                ..
            }) => Neighbor::Found {
                chunk_index,
                total_chunks,
                content,
            },
            _ => Neighbor::Missing {
                chunk_index: index as i64,
                reason: "chunk not found in index".to_string(),
            },
        })
    }

    async fn delete_ids(&self, ids: Vec<String>) -> Result<usize, VectorDbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.retry.run(|| self.db.delete_points(ids.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::file_chunk_id;
    use crate::vector_db::{MemoryVectorDB, ScoredPoint, StoredPoint};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn file_point(path: &str, index: usize, total: usize) -> IndexPoint {
        IndexPoint::new(
            IndexableUnit::FileChunk {
                filepath: path.to_string(),
                chunk_index: index,
                total_chunks: total,
                content: format!("{} part {}", path, index),
                last_modified: String::new(),
            },
            vec![1.0, 0.0],
        )
    }

    fn file_points(path: &str, total: usize) -> Vec<IndexPoint> {
        (0..total).map(|i| file_point(path, i, total)).collect()
    }

    fn sync_over(db: Arc<MemoryVectorDB>, batch_size: usize) -> IndexSynchronizer {
        IndexSynchronizer::new(db, batch_size, RetryPolicy::new(3, Duration::ZERO))
    }

    fn ids(db: &MemoryVectorDB) -> Vec<String> {
        db.points().into_iter().map(|p| p.id).collect()
    }

    /// Fails the first `failures` upserts, then delegates
    struct FlakyDb {
        inner: MemoryVectorDB,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorDatabase for FlakyDb {
        async fn initialize(&self, dimension: usize) -> Result<(), VectorDbError> {
            self.inner.initialize(dimension).await
        }

        async fn upsert_points(&self, points: Vec<IndexPoint>) -> Result<usize, VectorDbError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(VectorDbError::ConnectionFailed("connection reset".into()));
            }
            self.inner.upsert_points(points).await
        }

        async fn search(
            &self,
            query_vector: Vec<f32>,
            limit: usize,
            filter: &PointFilter,
        ) -> Result<Vec<ScoredPoint>, VectorDbError> {
            self.inner.search(query_vector, limit, filter).await
        }

        async fn scroll(&self, filter: &PointFilter) -> Result<Vec<StoredPoint>, VectorDbError> {
            self.inner.scroll(filter).await
        }

        async fn delete_points(&self, ids: Vec<String>) -> Result<usize, VectorDbError> {
            self.inner.delete_points(ids).await
        }

        async fn clear(&self) -> Result<(), VectorDbError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_upsert_in_batches() {
        let db = Arc::new(MemoryVectorDB::new());
        let sync = sync_over(db.clone(), 2);

        let written = sync.upsert_batch(file_points("a.ts", 5)).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(db.len(), 5);
    }

    #[tokio::test]
    async fn test_upsert_retries_transient_failures() {
        let db = Arc::new(FlakyDb {
            inner: MemoryVectorDB::new(),
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let sync = IndexSynchronizer::new(db.clone(), 64, RetryPolicy::new(3, Duration::ZERO));

        sync.upsert_batch(file_points("a.ts", 1)).await.unwrap();
        assert_eq!(db.calls.load(Ordering::SeqCst), 3);
        assert_eq!(db.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_surfaces_persistent_failure() {
        let db = Arc::new(FlakyDb {
            inner: MemoryVectorDB::new(),
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let sync = IndexSynchronizer::new(db.clone(), 64, RetryPolicy::new(2, Duration::ZERO));

        let err = sync.upsert_batch(file_points("a.ts", 1)).await.unwrap_err();
        assert!(matches!(err, VectorDbError::ConnectionFailed(_)));
        assert_eq!(db.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remove_stale_after_shrink() {
        let db = Arc::new(MemoryVectorDB::new());
        let sync = sync_over(db.clone(), 64);
        sync.upsert_batch(file_points("a.ts", 5)).await.unwrap();
        sync.upsert_batch(file_points("b.ts", 3)).await.unwrap();

        sync.upsert_batch(file_points("a.ts", 2)).await.unwrap();
        let removed = sync.remove_stale("a.ts", 2).await.unwrap();
        assert_eq!(removed, 3);

        let remaining = ids(&db);
        assert!(remaining.contains(&file_chunk_id("a.ts", 0)));
        assert!(remaining.contains(&file_chunk_id("a.ts", 1)));
        assert!(!remaining.contains(&file_chunk_id("a.ts", 2)));
        assert_eq!(remaining.len(), 5);
    }

    #[tokio::test]
    async fn test_remove_stale_noop_when_nothing_to_remove() {
        let db = Arc::new(MemoryVectorDB::new());
        let sync = sync_over(db.clone(), 64);
        sync.upsert_batch(file_points("a.ts", 2)).await.unwrap();

        assert_eq!(sync.remove_stale("a.ts", 2).await.unwrap(), 0);
        assert_eq!(db.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_for_deleted_files() {
        let db = Arc::new(MemoryVectorDB::new());
        let sync = sync_over(db.clone(), 64);
        sync.upsert_batch(file_points("keep.ts", 2)).await.unwrap();
        sync.upsert_batch(file_points("gone.ts", 3)).await.unwrap();
        sync.upsert_batch(vec![IndexPoint::new(
            IndexableUnit::CommitInfo {
                commit_oid: "abc".into(),
                message: "touch gone.ts".into(),
                author_name: "dev".into(),
                author_email: "dev@example.com".into(),
                date: "2024-01-01T00:00:00+00:00".into(),
                changed_files_summary: vec!["add gone.ts".into()],
                parent_oids: vec![],
            },
            vec![0.0, 1.0],
        )])
        .await
        .unwrap();

        let current: HashSet<String> = ["keep.ts".to_string()].into_iter().collect();
        assert_eq!(sync.remove_for_deleted_files(&current).await.unwrap(), 3);

        let remaining = ids(&db);
        assert_eq!(remaining.len(), 3);
        assert!(remaining.contains(&"commit:abc".to_string()));
        assert!(remaining.iter().all(|id| !id.contains("gone.ts")));
    }

    #[tokio::test]
    async fn test_adjacent_chunks_middle() {
        let db = Arc::new(MemoryVectorDB::new());
        let sync = sync_over(db, 64);
        sync.upsert_batch(file_points("a.ts", 3)).await.unwrap();

        let adjacent = sync.fetch_adjacent_chunks("a.ts", 1).await.unwrap();
        assert_eq!(
            adjacent.previous,
            Neighbor::Found {
                chunk_index: 0,
                total_chunks: 3,
                content: "a.ts part 0".into()
            }
        );
        assert!(adjacent.next.is_found());
    }

    #[tokio::test]
    async fn test_adjacent_chunks_at_edges() {
        let db = Arc::new(MemoryVectorDB::new());
        let sync = sync_over(db, 64);
        sync.upsert_batch(file_points("a.ts", 2)).await.unwrap();

        let first = sync.fetch_adjacent_chunks("a.ts", 0).await.unwrap();
        assert_eq!(
            first.previous,
            Neighbor::Missing {
                chunk_index: -1,
                reason: "start of file".into()
            }
        );
        assert!(first.next.is_found());

        let last = sync.fetch_adjacent_chunks("a.ts", 1).await.unwrap();
        assert!(last.previous.is_found());
        assert!(matches!(last.next, Neighbor::Missing { chunk_index: 2, .. }));
    }
}
