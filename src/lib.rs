//! # repo-rag - Git Repository Indexing and Refining Semantic Search
//!
//! Incrementally indexes a git repository's file contents, commit history and diffs into a
//! vector store, and serves semantic search that rewrites low-relevance queries until the
//! results are good enough or the rewrite budget runs out.
//!
//! ## Architecture
//!
//! ```text
//!  repository ──► GitWalker ──► TextChunker ──► EmbeddingProvider ──► IndexSynchronizer ──► VectorDatabase
//!                                                       ▲                                       │
//!  query ──► search_with_refinement ──► VectorSearchBackend ◄───────────────────────────────────┘
//!                   │
//!                   └── QueryRewriter (broaden / focus / tweak)
//! ```
//!
//! Indexing is driven by [`RagClient`], which owns the process-wide indexing status and
//! admits at most one run at a time.
//!
//! ## Modules
//!
//! - [`client`]: indexing orchestration and the library API
//! - [`git`]: tracked files, commit history, per-commit changes and diffs
//! - [`indexer`]: character-window chunking
//! - [`embedding`]: embedding providers (HTTP service, offline hashing)
//! - [`vector_db`]: vector store abstraction (Qdrant, in-memory)
//! - [`synchronizer`]: batched upserts and stale-point removal
//! - [`search`]: query refinement loop and rewriters
//! - [`status`]: indexing state machine
//! - [`retry`] and [`rate_limit`]: outbound call policies
//!
//! ## Usage Example
//!
//! ```no_run
//! use repo_rag::{Config, RagClient, SearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RagClient::with_config(Config::new()?).await?;
//!     client.run_indexing(".").await;
//!
//!     let response = client.search(SearchRequest::new("how are retries scheduled")).await?;
//!     println!("{} results for '{}'", response.results.len(), response.refined_query);
//!     Ok(())
//! }
//! ```

/// Persistent content-hash cache for skipping unchanged files
pub mod cache;

/// Library client and indexing pipeline
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding providers
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Git repository reading and diff summaries
pub mod git;

/// Exclude-pattern matching
pub mod glob_utils;

/// Text chunking
pub mod indexer;

/// Platform cache and config directories
pub mod paths;

/// Sliding-window request throttling
pub mod rate_limit;

/// Exponential-backoff retry
pub mod retry;

/// Query refinement search loop
pub mod search;

/// Indexing status state machine
pub mod status;

/// Vector index consistency maintenance
pub mod synchronizer;

/// Indexable units, points and request/response types
pub mod types;

/// Vector database abstraction supporting Qdrant and an in-memory store
pub mod vector_db;

pub use client::RagClient;
pub use config::Config;
pub use error::RagError;
pub use status::{IndexingPhase, IndexingStatus};
pub use types::{
    AdjacentChunks, IndexStatistics, IndexableUnit, Neighbor, SearchHit, SearchRequest,
    SearchResponse, json_schemas,
};
