//! Core library client for repo-rag
//!
//! [`RagClient`] owns the embedding provider, the vector store, the indexing status and the
//! hash cache, and exposes indexing, status, search and index maintenance.

use crate::cache::HashCache;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, create_provider};
use crate::error::RagError;
use crate::git;
use crate::glob_utils::ExcludeMatcher;
use crate::indexer::TextChunker;
use crate::search::{
    HeuristicRewriter, QueryRewriter, RefinementOptions, VectorSearchBackend,
    search_with_refinement,
};
use crate::status::{IndexingStatus, StatusTracker};
use crate::synchronizer::IndexSynchronizer;
use crate::types::*;
use crate::vector_db::{VectorDatabase, create_vector_db};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use index_lock::{IndexLockGuard, IndexLockResult};

/// Main client for indexing a repository and searching the index
///
/// Cloning is cheap; clones share the store, the status and the hash cache, so at most
/// one indexing run is active across all of them.
///
/// # Example
///
/// ```no_run
/// use repo_rag::{RagClient, SearchRequest};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = RagClient::new().await?;
///
///     let status = client.run_indexing("/path/to/repo").await;
///     println!("Indexed {} files", status.files_processed);
///
///     let response = client.search(SearchRequest::new("retry with backoff")).await?;
///     for hit in response.results {
///         println!("{} ({:.2})", hit.id, hit.score);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RagClient {
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) vector_db: Arc<dyn VectorDatabase>,
    pub(crate) chunker: TextChunker,
    pub(crate) exclude: Arc<ExcludeMatcher>,
    pub(crate) rewriter: Arc<dyn QueryRewriter>,
    // Persistent hash cache for skip-if-unchanged runs
    pub(crate) hash_cache: Arc<RwLock<HashCache>>,
    pub(crate) cache_path: PathBuf,
    pub(crate) config: Arc<Config>,
    pub(crate) status: StatusTracker,
}

impl RagClient {
    /// Create a client from the configuration file and environment
    pub async fn new() -> Result<Self> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    /// Create a client with the backends named by `config`
    pub async fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        tracing::info!("Initializing RAG client");
        tracing::debug!("Vector DB backend: {}", config.vector_db.backend);
        tracing::debug!("Embedding provider: {}", config.embedding.provider);

        let embedder =
            create_provider(&config.embedding).context("Failed to initialize embedding provider")?;
        let vector_db = create_vector_db(&config.vector_db)
            .await
            .context("Failed to initialize vector database")?;

        // Search-only processes need the collection too, with a matching dimension
        vector_db
            .initialize(embedder.dimension())
            .await
            .context("Failed to initialize vector store collection")?;

        Self::with_components(config, embedder, vector_db)
    }

    /// Create a client around existing backends
    pub fn with_components(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_db: Arc<dyn VectorDatabase>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(config.indexing.chunk_size, config.indexing.chunk_overlap)
            .map_err(RagError::from)?;
        let exclude = ExcludeMatcher::new(&config.indexing.exclude_patterns);

        let cache_path = config.cache.hash_cache_path.clone();
        let hash_cache = HashCache::load(&cache_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load hash cache: {}, starting fresh", e);
            HashCache::default()
        });

        Ok(Self {
            embedder,
            vector_db,
            chunker,
            exclude: Arc::new(exclude),
            rewriter: Arc::new(HeuristicRewriter::new()),
            hash_cache: Arc::new(RwLock::new(hash_cache)),
            cache_path,
            config: Arc::new(config),
            status: StatusTracker::new(),
        })
    }

    /// Replace the query rewriter used by [`search`](Self::search)
    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Normalize a path to a canonical absolute form for consistent cache keys
    pub fn normalize_path(path: &Path) -> Result<String> {
        let canonical = std::fs::canonicalize(path)
            .with_context(|| format!("Failed to canonicalize path: {}", path.display()))?;
        Ok(canonical.to_string_lossy().to_string())
    }

    /// Index `repo_path` and wait for the run to finish
    ///
    /// If a run is already active this starts nothing and returns its status.
    pub async fn run_indexing(&self, repo_path: impl AsRef<Path>) -> IndexingStatus {
        let repo_path = repo_path.as_ref().to_path_buf();
        match IndexLockGuard::acquire(&self.status, &repo_path.display().to_string()) {
            IndexLockResult::Acquired(guard) => indexing::do_index(self, guard, repo_path).await,
            IndexLockResult::AlreadyRunning(status) => status,
        }
    }

    /// Start indexing `repo_path` in the background
    ///
    /// Returns once the run has been admitted (or found already running) with the status at
    /// that moment. An in-flight run is never cancelled.
    pub fn trigger_update(&self, repo_path: impl AsRef<Path>) -> IndexingStatus {
        let repo_path = repo_path.as_ref().to_path_buf();
        match IndexLockGuard::acquire(&self.status, &repo_path.display().to_string()) {
            IndexLockResult::Acquired(guard) => {
                let snapshot = guard.tracker().snapshot();
                let client = self.clone();
                tokio::spawn(async move {
                    indexing::do_index(&client, guard, repo_path).await;
                });
                snapshot
            }
            IndexLockResult::AlreadyRunning(status) => status,
        }
    }

    /// Snapshot of the current or last indexing run
    pub fn get_status(&self) -> IndexingStatus {
        self.status.snapshot()
    }

    /// Semantic search with relevance-driven query refinement
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        request.validate().map_err(RagError::from)?;
        let start = Instant::now();

        let mut options = RefinementOptions::from_config(&self.config.search);
        if let Some(limit) = request.limit {
            options.limit = limit;
        }
        if let Some(max_refinements) = request.max_refinements {
            options.max_refinements = max_refinements;
        }
        if let Some(threshold) = request.relevance_threshold {
            options.relevance_threshold = threshold;
        }
        options.scope_files = request.scope_files;

        let backend = VectorSearchBackend::new(self.embedder.clone(), self.vector_db.clone());
        let outcome =
            search_with_refinement(&backend, self.rewriter.as_ref(), &request.query, &options)
                .await
                .context("Failed to search")?;

        tracing::info!(
            "Search '{}' -> {} results, relevance {:.3} after {} refinements",
            request.query,
            outcome.results.len(),
            outcome.relevance_score,
            outcome.refinements
        );

        Ok(SearchResponse {
            results: outcome.results,
            refined_query: outcome.refined_query,
            relevance_score: outcome.relevance_score,
            refinements: outcome.refinements,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Chunks before and after `chunk_index` of `filepath`
    pub async fn fetch_adjacent_chunks(
        &self,
        filepath: &str,
        chunk_index: usize,
    ) -> Result<AdjacentChunks> {
        self.synchronizer()
            .fetch_adjacent_chunks(filepath, chunk_index)
            .await
            .with_context(|| format!("Failed to fetch chunks adjacent to {}", filepath))
    }

    /// Bounded `git diff` between the two most recent commits; never fails
    pub async fn diff_summary(&self, repo_path: impl AsRef<Path>) -> String {
        git::diff_summary(
            repo_path.as_ref(),
            Duration::from_secs(self.config.git.diff_timeout_secs),
            self.config.git.max_diff_summary_chars,
        )
        .await
    }

    /// Point counts in the index
    pub async fn get_statistics(&self) -> Result<IndexStatistics> {
        self.vector_db
            .get_statistics()
            .await
            .context("Failed to get statistics")
    }

    /// Remove every indexed point and forget recorded file hashes
    pub async fn clear_index(&self) -> Result<()> {
        self.vector_db
            .clear()
            .await
            .context("Failed to clear index")?;

        let mut cache = self.hash_cache.write().await;
        cache.roots.clear();
        if self.config.indexing.skip_unchanged_files
            && let Err(e) = cache.save(&self.cache_path)
        {
            tracing::warn!("Failed to save cleared cache: {}", e);
        }
        Ok(())
    }

    /// Get the configuration used by this client
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the embedding dimension used by this client
    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub(crate) fn synchronizer(&self) -> IndexSynchronizer {
        IndexSynchronizer::from_config(self.vector_db.clone(), &self.config.vector_db)
    }
}

// Single-flight guard for indexing runs
pub(crate) mod index_lock;
// Indexing pipeline
pub(crate) mod indexing;
