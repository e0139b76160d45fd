//! Relevance-refining semantic search
//!
//! A query is embedded and searched; while the top score stays under the relevance
//! threshold the query is rewritten (broaden, focus or tweak, picked by score band) and
//! searched again, within a fixed budget of rewrites.

mod refine;
mod rewrite;

pub use refine::{RefinementOptions, RefinementOutcome, RefinementState, search_with_refinement};
pub use rewrite::{HeuristicRewriter, QueryRewriter, RewriteStrategy};

use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::types::SearchHit;
use crate::vector_db::{PointFilter, VectorDatabase};
use async_trait::async_trait;
use std::sync::Arc;

/// Embed-and-search primitive used by the refinement loop
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Top `limit` hits for `query`, best first; `scope_files` restricts by file path when
    /// non-empty
    async fn search(
        &self,
        query: &str,
        limit: usize,
        scope_files: &[String],
    ) -> Result<Vec<SearchHit>, RagError>;
}

/// [`SearchBackend`] over an embedding provider and a vector store
#[derive(Clone)]
pub struct VectorSearchBackend {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_db: Arc<dyn VectorDatabase>,
}

impl VectorSearchBackend {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, vector_db: Arc<dyn VectorDatabase>) -> Self {
        Self {
            embedder,
            vector_db,
        }
    }
}

#[async_trait]
impl SearchBackend for VectorSearchBackend {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        scope_files: &[String],
    ) -> Result<Vec<SearchHit>, RagError> {
        let vector = self.embedder.embed(query).await?;
        let filter = PointFilter::new().any_filepath(scope_files);
        let points = self.vector_db.search(vector, limit, &filter).await?;

        Ok(points
            .into_iter()
            .map(|p| SearchHit::from_unit(p.id, p.score, &p.payload))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::types::{IndexPoint, IndexableUnit};
    use crate::vector_db::MemoryVectorDB;

    async fn indexed_backend() -> VectorSearchBackend {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let db = Arc::new(MemoryVectorDB::new());
        db.initialize(64).await.unwrap();

        let mut points = Vec::new();
        for (path, content) in [
            ("src/retry.rs", "exponential backoff retry delay"),
            ("src/limit.rs", "sliding window rate limiter"),
        ] {
            let unit = IndexableUnit::FileChunk {
                filepath: path.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                content: content.to_string(),
                last_modified: String::new(),
            };
            let vector = embedder.embed_text(content).unwrap();
            points.push(IndexPoint::new(unit, vector));
        }
        db.upsert_points(points).await.unwrap();

        VectorSearchBackend::new(embedder, db)
    }

    #[tokio::test]
    async fn test_backend_ranks_matching_file_first() {
        let backend = indexed_backend().await;
        let hits = backend.search("rate limiter window", 5, &[]).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].filepath.as_deref(), Some("src/limit.rs"));
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_backend_scope_files() {
        let backend = indexed_backend().await;
        let hits = backend
            .search("rate limiter window", 5, &["src/retry.rs".to_string()])
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "file:src/retry.rs:chunk:0");
    }
}
