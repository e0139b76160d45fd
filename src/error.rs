/// Error taxonomy of the indexing and retrieval engine
///
/// Each subsystem has its own `thiserror` enum; [`RagError`] wraps them for the library
/// surface. Orchestration code adds context with `anyhow` and converts back at the edge.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector database error: {0}")]
    VectorDb(#[from] VectorDbError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Hash cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures of the embedding service or of the vectors it returns
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    RequestFailed(String),

    #[error("Embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("Embedding service returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding contains a non-finite value at position {0}")]
    NonFiniteValue(usize),

    #[error("Embedding input is empty after preprocessing")]
    EmptyInput,
}

impl EmbeddingError {
    /// Network failures, timeouts, throttling and server errors are transient.
    /// Anything wrong with the returned data is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::RequestFailed(_) | EmbeddingError::Timeout(_) => true,
            EmbeddingError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::MalformedResponse(_)
            | EmbeddingError::DimensionMismatch { .. }
            | EmbeddingError::NonFiniteValue(_)
            | EmbeddingError::EmptyInput => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum VectorDbError {
    #[error("Failed to connect to vector database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create collection '{collection}': {reason}")]
    CollectionCreationFailed { collection: String, reason: String },

    #[error("Collection '{collection}' has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to store points: {0}")]
    StoreFailed(String),

    #[error("Failed to search points: {0}")]
    SearchFailed(String),

    #[error("Failed to scroll points: {0}")]
    ScrollFailed(String),

    #[error("Failed to delete points: {0}")]
    DeleteFailed(String),

    #[error("Invalid point payload: {0}")]
    InvalidPayload(String),
}

/// Failures that stop an indexing run or skip one file
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Not a git repository (or HEAD does not resolve): {0}")]
    InvalidRepository(String),

    #[error("Failed to list tracked files: {0}")]
    ListFailed(String),

    #[error("Failed to read '{file}': {reason}")]
    FileReadFailed { file: String, reason: String },

    #[error("Not UTF-8 text: {0}")]
    InvalidUtf8(String),

    #[error("File is {size} bytes, limit is {max}")]
    FileTooLarge { size: usize, max: usize },

    #[error("Indexing run was interrupted")]
    Interrupted,
}

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Rejected search requests
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Empty {0}")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Failed to open git repository: {0}")]
    OpenFailed(String),

    #[error("Failed to resolve HEAD: {0}")]
    HeadNotFound(String),

    #[error("Failed to read tree: {0}")]
    TreeReadFailed(String),

    #[error("Failed to iterate commits: {0}")]
    IterFailed(String),

    #[error("git {command} exited with code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("git {command} timed out after {secs} seconds")]
    CommandTimedOut { command: String, secs: u64 },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to write '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Other(format!("{:#}", err))
    }
}

impl RagError {
    /// Transient failures worth trying again later
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Embedding(e) => e.is_retryable(),
            RagError::VectorDb(VectorDbError::ConnectionFailed(_)) => true,
            RagError::Git(GitError::CommandTimedOut { .. }) => true,
            RagError::Io(_) => true,
            _ => false,
        }
    }
}
