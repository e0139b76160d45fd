// The in-memory store is always available; used for tests and offline runs
pub mod memory_client;
pub use memory_client::MemoryVectorDB;

// Qdrant is the production store (requires external server)
#[cfg(feature = "qdrant-backend")]
pub mod qdrant_client;
#[cfg(feature = "qdrant-backend")]
pub use qdrant_client::QdrantVectorDB;

use crate::config::VectorDbConfig;
use crate::error::{ConfigError, RagError, VectorDbError};
use crate::types::{DataType, IndexPoint, IndexStatistics, IndexableUnit};
use std::collections::HashSet;
use std::sync::Arc;

/// Trait for vector database operations
///
/// Points are keyed by their content-addressed id; payloads are [`IndexableUnit`]s.
#[async_trait::async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Ensure the collection exists with the given vector dimension
    async fn initialize(&self, dimension: usize) -> Result<(), VectorDbError>;

    /// Insert or replace points by id; returns the number written
    async fn upsert_points(&self, points: Vec<IndexPoint>) -> Result<usize, VectorDbError>;

    /// Nearest neighbours by cosine similarity, best first
    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: &PointFilter,
    ) -> Result<Vec<ScoredPoint>, VectorDbError>;

    /// Every point matching the filter (payload only)
    async fn scroll(&self, filter: &PointFilter) -> Result<Vec<StoredPoint>, VectorDbError>;

    /// Delete points by id; returns the number of ids submitted
    async fn delete_points(&self, ids: Vec<String>) -> Result<usize, VectorDbError>;

    /// Remove all points
    async fn clear(&self) -> Result<(), VectorDbError>;

    /// Point counts by data type
    async fn get_statistics(&self) -> Result<IndexStatistics, VectorDbError> {
        let points = self.scroll(&PointFilter::default()).await?;
        let mut stats = IndexStatistics {
            total_points: points.len(),
            ..Default::default()
        };
        let mut files = HashSet::new();
        for point in &points {
            match &point.payload {
                IndexableUnit::FileChunk { filepath, .. } => {
                    stats.file_chunks += 1;
                    files.insert(filepath.as_str());
                }
                IndexableUnit::CommitInfo { .. } => stats.commits += 1,
                IndexableUnit::DiffChunk { .. } => stats.diff_chunks += 1,
            }
        }
        stats.indexed_files = files.len();
        Ok(stats)
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: IndexableUnit,
}

/// A stored point without its vector
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub payload: IndexableUnit,
}

/// Conjunction of payload conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    /// Matches when the field equals any of the values
    AnyText(Vec<String>),
}

impl PointFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, field: &str, value: FieldValue) -> Self {
        self.must.push(FieldCondition {
            field: field.to_string(),
            value,
        });
        self
    }

    pub fn must_not(mut self, field: &str, value: FieldValue) -> Self {
        self.must_not.push(FieldCondition {
            field: field.to_string(),
            value,
        });
        self
    }

    pub fn data_type(self, data_type: DataType) -> Self {
        self.must("dataType", FieldValue::Text(data_type.as_str().to_string()))
    }

    pub fn filepath(self, filepath: &str) -> Self {
        self.must("filepath", FieldValue::Text(filepath.to_string()))
    }

    pub fn chunk_index(self, index: usize) -> Self {
        self.must("chunk_index", FieldValue::Integer(index as i64))
    }

    /// Restrict to points whose `filepath` is one of `files`; no-op for an empty list
    pub fn any_filepath(self, files: &[String]) -> Self {
        if files.is_empty() {
            self
        } else {
            self.must("filepath", FieldValue::AnyText(files.to_vec()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Evaluate the filter against a JSON payload
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        let all_must = self.must.iter().all(|cond| {
            payload
                .get(&cond.field)
                .is_some_and(|val| field_matches(val, &cond.value))
        });
        let none_excluded = self.must_not.iter().all(|cond| {
            !payload
                .get(&cond.field)
                .is_some_and(|val| field_matches(val, &cond.value))
        });
        all_must && none_excluded
    }
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
        FieldValue::AnyText(values) => val
            .as_str()
            .is_some_and(|s| values.iter().any(|v| v == s)),
    }
}

/// Build the backend selected by `config.backend`
pub async fn create_vector_db(config: &VectorDbConfig) -> Result<Arc<dyn VectorDatabase>, RagError> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("Using in-memory vector database");
            Ok(Arc::new(MemoryVectorDB::new()))
        }
        #[cfg(feature = "qdrant-backend")]
        "qdrant" => {
            tracing::info!("Using Qdrant vector database at {}", config.qdrant_url);
            Ok(Arc::new(QdrantVectorDB::with_config(config)?))
        }
        other => Err(ConfigError::InvalidValue {
            key: "vector_db.backend".to_string(),
            reason: format!("backend '{}' is not available in this build", other),
        }
        .into()),
    }
}
