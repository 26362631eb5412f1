//! Error types for the exam preparation toolkit.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised by text chunking.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors raised by the in-memory vector index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("dimension mismatch: index stores {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding model error: {0}")]
    Model(#[from] ModelError),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) | EmbeddingError::Model(_) => false,
        }
    }
}

/// Errors raised by the local ONNX embedding model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),
}

/// Errors raised by the retrieval store.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no document has been indexed yet")]
    NotIndexed,

    #[error("the indexed document yielded no context chunks")]
    EmptyContext,

    #[error("failed to embed query: {0}")]
    EmbeddingFailure(#[source] EmbeddingError),

    #[error("corpus was not replaced, previous index kept: {0}")]
    CorpusReplaceFailure(#[source] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the text generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing API key: set {0} in the environment or .env")]
    MissingApiKey(&'static str),

    #[error("generation request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("generation service error: {0}")]
    ServerError(String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::RequestError(e) => e.is_timeout() || e.is_connect(),
            GenerationError::ServerError(msg) => {
                msg.contains("503") || msg.contains("429") || msg.contains("502")
            }
            GenerationError::MissingApiKey(_) | GenerationError::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised while reading an uploaded document.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),

    #[error("could not read document: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("document contains no extractable text")]
    Empty,
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to talking to the background daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon is not running")]
    NotRunning,

    #[error("failed to spawn daemon: {0}")]
    SpawnError(String),

    #[error("failed to connect to daemon: {0}")]
    ConnectionFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("{0}")]
    Remote(String),

    #[error("timed out waiting for daemon")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("document error: {0}")]
    Loader(#[from] LoaderError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Message suitable for showing to someone who just ran a command.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Retrieval(RetrievalError::NotIndexed) => {
                "No documents indexed. Please upload a file first.".to_string()
            }
            AppError::Retrieval(RetrievalError::EmptyContext) => {
                "The indexed document has no text to build questions from. Upload another file."
                    .to_string()
            }
            AppError::Loader(LoaderError::Empty) => {
                "Could not extract text from file.".to_string()
            }
            AppError::Loader(e) => format!("Could not read document: {e}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".to_string()).is_retryable());
        assert!(!EmbeddingError::InvalidResponse("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_user_messages_are_distinguishable() {
        let not_indexed = AppError::from(RetrievalError::NotIndexed).user_message();
        let unreadable = AppError::from(LoaderError::Empty).user_message();
        let empty = AppError::from(RetrievalError::EmptyContext).user_message();
        assert_ne!(not_indexed, unreadable);
        assert_ne!(not_indexed, empty);
        assert!(not_indexed.contains("upload"));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = IndexError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: index stores 3-d vectors, got 2-d"
        );
    }
}
