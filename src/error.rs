//! Error types for the product ingestion pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised while reading the source dataset. Always fatal to the run.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("dataset read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record at offset {offset}: {source}")]
    Malformed {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record at offset {offset}: {reason}")]
    Shape { offset: u64, reason: String },

    #[error("duplicate record id {id} at offset {offset}")]
    DuplicateId { id: String, offset: u64 },
}

/// Errors related to embedding operations.
///
/// The last three variants only ever describe a single record and are reported
/// inside a batch result rather than failing the whole batch.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    Connection(String),

    #[error("embedding server returned status {status}: {body}")]
    Server { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("record has no image or text to embed")]
    NoInput,

    #[error("embedding has dimension {actual}, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("record rejected by embedding server: {0}")]
    Rejected(String),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Connection(_) | EmbeddingError::Timeout => true,
            EmbeddingError::Server { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::Request(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::NoInput
            | EmbeddingError::Dimension { .. }
            | EmbeddingError::Rejected(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to Qdrant: {0}")]
    Connection(String),

    #[error("collection error: {0}")]
    Collection(String),

    #[error("upsert error: {0}")]
    Upsert(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("points rejected by store: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Classifies a raw client error message into a transient or permanent upsert failure.
    pub fn from_upsert_message(msg: String) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("invalidargument")
            || lower.contains("invalid argument")
            || lower.contains("wrong input")
            || lower.contains("bad request")
            || lower.contains("vector dimension error")
        {
            StoreError::Rejected(msg)
        } else {
            StoreError::Upsert(msg)
        }
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Connection(_) => true,
            StoreError::Rejected(_) => false,
            StoreError::Collection(msg) | StoreError::Upsert(msg) | StoreError::Search(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("timed out")
                    || msg_lower.contains("deadline")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
                    || msg_lower.contains("resource exhausted")
            }
        }
    }
}

/// Errors related to durable progress tracking. Always fatal to the job.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint storage error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {} is corrupt: {content:?}", path.display())]
    Corrupt { path: PathBuf, content: String },

    #[error("checkpoint must advance: attempted {attempted} after {committed}")]
    NotMonotonic { committed: u64, attempted: u64 },
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    Path(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },
}

/// Errors that end an ingestion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("embedder returned {actual} results for {expected} records")]
    ResultCount { expected: usize, actual: usize },

    #[error("job timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("job cancelled")]
    Cancelled,

    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// Terminal report of a `FAILED` run.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: PipelineError,
    /// Batch that was in flight when the run failed, if any.
    pub failing_batch: Option<u64>,
    /// Last batch whose commit was durably recorded.
    pub last_committed: Option<u64>,
}

/// Errors related to search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_status_classification() {
        let busy = EmbeddingError::Server {
            status: 429,
            body: String::new(),
        };
        let down = EmbeddingError::Server {
            status: 503,
            body: String::new(),
        };
        let bad = EmbeddingError::Server {
            status: 400,
            body: "bad input".to_string(),
        };
        assert!(busy.is_retryable());
        assert!(down.is_retryable());
        assert!(!bad.is_retryable());
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(!EmbeddingError::NoInput.is_retryable());
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::Connection("refused".to_string()).is_retryable());
        assert!(StoreError::Upsert("status: Unavailable".to_string()).is_retryable());
        assert!(StoreError::Upsert("Deadline exceeded".to_string()).is_retryable());
        assert!(!StoreError::Upsert("unknown failure".to_string()).is_retryable());
        assert!(!StoreError::Rejected("timeout in payload".to_string()).is_retryable());
    }

    #[test]
    fn test_upsert_message_rejected() {
        let err = StoreError::from_upsert_message(
            "status: InvalidArgument, message: \"Wrong input: Vector dimension error\"".to_string(),
        );
        assert!(matches!(err, StoreError::Rejected(_)));

        let err = StoreError::from_upsert_message("transport error: connection reset".to_string());
        assert!(matches!(err, StoreError::Upsert(_)));
        assert!(err.is_retryable());
    }
}
