use crate::error::ValidationError;
use crate::status::IndexingStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Maximum number of results a single search may request
pub const MAX_SEARCH_LIMIT: usize = 100;

/// How a path changed between two tree states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Present only in the newer tree
    Add,
    /// Present in both trees with different content
    Modify,
    /// Present only in the older tree
    Delete,
    /// Entry kind changed (blob, symlink, submodule)
    Typechange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::Typechange => "typechange",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of an indexable unit, as stored in the `dataType` payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    FileChunk,
    CommitInfo,
    DiffChunk,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::FileChunk => "file_chunk",
            DataType::CommitInfo => "commit_info",
            DataType::DiffChunk => "diff_chunk",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of repository state that becomes one vector-store point
///
/// Serialized form is the point payload: a JSON object tagged by `dataType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "dataType", rename_all = "snake_case")]
pub enum IndexableUnit {
    /// One window of a tracked file's text at HEAD
    FileChunk {
        filepath: String,
        chunk_index: usize,
        total_chunks: usize,
        content: String,
        /// Source file mtime, ISO-8601
        last_modified: String,
    },
    /// Commit metadata, embedded through its message
    CommitInfo {
        commit_oid: String,
        message: String,
        author_name: String,
        author_email: String,
        /// Commit time, ISO-8601
        date: String,
        /// Entries of the form `"<op> <path>"`
        changed_files_summary: Vec<String>,
        parent_oids: Vec<String>,
    },
    /// One window of a commit's unified diff for one file
    DiffChunk {
        commit_oid: String,
        filepath: String,
        chunk_index: usize,
        total_chunks: usize,
        content: String,
        change_type: ChangeType,
    },
}

impl IndexableUnit {
    /// Deterministic, content-addressed point identifier
    pub fn point_id(&self) -> String {
        match self {
            IndexableUnit::FileChunk {
                filepath,
                chunk_index,
                ..
            } => file_chunk_id(filepath, *chunk_index),
            IndexableUnit::CommitInfo { commit_oid, .. } => format!("commit:{}", commit_oid),
            IndexableUnit::DiffChunk {
                commit_oid,
                filepath,
                chunk_index,
                ..
            } => format!("diff:{}:{}:chunk:{}", commit_oid, filepath, chunk_index),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            IndexableUnit::FileChunk { .. } => DataType::FileChunk,
            IndexableUnit::CommitInfo { .. } => DataType::CommitInfo,
            IndexableUnit::DiffChunk { .. } => DataType::DiffChunk,
        }
    }

    /// Text that gets embedded for this unit
    pub fn content(&self) -> &str {
        match self {
            IndexableUnit::FileChunk { content, .. } | IndexableUnit::DiffChunk { content, .. } => {
                content
            }
            IndexableUnit::CommitInfo { message, .. } => message,
        }
    }

    /// Text handed to the embedder; never blank.
    ///
    /// A window of only whitespace, or a commit with an empty message, is embedded from its
    /// location so that every unit still gets a point.
    pub fn embedding_text(&self) -> Cow<'_, str> {
        let content = self.content();
        if has_text(content) {
            return Cow::Borrowed(content);
        }
        Cow::Owned(match self {
            IndexableUnit::FileChunk {
                filepath,
                chunk_index,
                total_chunks,
                ..
            } => format!("{} chunk {} of {}", filepath, chunk_index + 1, total_chunks),
            IndexableUnit::CommitInfo {
                commit_oid,
                changed_files_summary,
                ..
            } => {
                let mut text = format!("commit {}", commit_oid);
                for entry in changed_files_summary {
                    text.push('\n');
                    text.push_str(entry);
                }
                text
            }
            IndexableUnit::DiffChunk {
                commit_oid,
                filepath,
                chunk_index,
                total_chunks,
                change_type,
                ..
            } => format!(
                "{} {} in commit {} chunk {} of {}",
                change_type,
                filepath,
                commit_oid,
                chunk_index + 1,
                total_chunks
            ),
        })
    }

    pub fn filepath(&self) -> Option<&str> {
        match self {
            IndexableUnit::FileChunk { filepath, .. } | IndexableUnit::DiffChunk { filepath, .. } => {
                Some(filepath)
            }
            IndexableUnit::CommitInfo { .. } => None,
        }
    }

    pub fn commit_oid(&self) -> Option<&str> {
        match self {
            IndexableUnit::CommitInfo { commit_oid, .. }
            | IndexableUnit::DiffChunk { commit_oid, .. } => Some(commit_oid),
            IndexableUnit::FileChunk { .. } => None,
        }
    }

    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            IndexableUnit::FileChunk { chunk_index, .. }
            | IndexableUnit::DiffChunk { chunk_index, .. } => Some(*chunk_index),
            IndexableUnit::CommitInfo { .. } => None,
        }
    }

    pub fn total_chunks(&self) -> Option<usize> {
        match self {
            IndexableUnit::FileChunk { total_chunks, .. }
            | IndexableUnit::DiffChunk { total_chunks, .. } => Some(*total_chunks),
            IndexableUnit::CommitInfo { .. } => None,
        }
    }
}

fn has_text(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace() && !c.is_control())
}

/// Point id of a file chunk
pub fn file_chunk_id(filepath: &str, chunk_index: usize) -> String {
    format!("file:{}:chunk:{}", filepath, chunk_index)
}

/// A unit paired with its embedding, ready for upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: IndexableUnit,
}

impl IndexPoint {
    pub fn new(payload: IndexableUnit, vector: Vec<f32>) -> Self {
        Self {
            id: payload.point_id(),
            vector,
            payload,
        }
    }
}

/// Request to search the index
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRequest {
    /// The question or search query
    pub query: String,
    /// Restrict results to these repository-relative file paths
    #[serde(default)]
    pub scope_files: Vec<String>,
    /// Number of results to return (default from configuration)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Override the configured number of query rewrites
    #[serde(default)]
    pub max_refinements: Option<usize>,
    /// Override the configured relevance threshold (0.0 to 1.0)
    #[serde(default)]
    pub relevance_threshold: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope_files: Vec::new(),
            limit: None,
            max_refinements: None,
            relevance_threshold: None,
        }
    }

    /// Check request constraints before any embedding call is made
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::Empty("search query".to_string()));
        }

        if let Some(limit) = self.limit
            && !(1..=MAX_SEARCH_LIMIT).contains(&limit)
        {
            return Err(ValidationError::ConstraintViolation {
                field: "limit".to_string(),
                constraint: format!("between 1 and {}", MAX_SEARCH_LIMIT),
                actual: limit.to_string(),
            });
        }

        if let Some(threshold) = self.relevance_threshold
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(ValidationError::ConstraintViolation {
                field: "relevance_threshold".to_string(),
                constraint: "between 0.0 and 1.0".to_string(),
                actual: threshold.to_string(),
            });
        }

        Ok(())
    }
}

/// A single search result projected from a stored point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity (higher is more relevant)
    pub score: f32,
    pub data_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_oid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// Chunk text, or the commit message for commit points
    pub content: String,
}

impl SearchHit {
    pub fn from_unit(id: String, score: f32, unit: &IndexableUnit) -> Self {
        Self {
            id,
            score,
            data_type: unit.data_type(),
            filepath: unit.filepath().map(str::to_string),
            commit_oid: unit.commit_oid().map(str::to_string),
            chunk_index: unit.chunk_index(),
            total_chunks: unit.total_chunks(),
            content: unit.content().to_string(),
        }
    }
}

/// Response from a refining search
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Results of the returned iteration, ordered by score
    pub results: Vec<SearchHit>,
    /// Query text that produced `results`
    pub refined_query: String,
    /// Top score of `results` (0 when empty)
    pub relevance_score: f32,
    /// Number of rewrites performed
    pub refinements: usize,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// One side of an adjacent-chunk lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Neighbor {
    Found {
        chunk_index: usize,
        total_chunks: usize,
        content: String,
    },
    Missing {
        chunk_index: i64,
        reason: String,
    },
}

impl Neighbor {
    pub fn is_found(&self) -> bool {
        matches!(self, Neighbor::Found { .. })
    }
}

/// Chunks immediately before and after a given file chunk
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AdjacentChunks {
    pub filepath: String,
    pub chunk_index: usize,
    pub previous: Neighbor,
    pub next: Neighbor,
}

/// Statistics about the stored index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexStatistics {
    pub total_points: usize,
    pub file_chunks: usize,
    pub commits: usize,
    pub diff_chunks: usize,
    /// Distinct file paths with at least one file chunk
    pub indexed_files: usize,
}

/// JSON Schemas of the stored payload and of every request and response, keyed by type name
pub fn json_schemas() -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
    let schemas = [
        ("IndexableUnit", schemars::schema_for!(IndexableUnit)),
        ("SearchRequest", schemars::schema_for!(SearchRequest)),
        ("SearchResponse", schemars::schema_for!(SearchResponse)),
        ("AdjacentChunks", schemars::schema_for!(AdjacentChunks)),
        ("IndexStatistics", schemars::schema_for!(IndexStatistics)),
        ("IndexingStatus", schemars::schema_for!(IndexingStatus)),
    ];
    schemas
        .into_iter()
        .map(|(name, schema)| Ok((name.to_string(), serde_json::to_value(&schema)?)))
        .collect()
}

#[cfg(test)]
mod tests;
