//! Error types for the wikiseek retrieval engine.

use thiserror::Error;

/// Result type alias using WikiseekError.
pub type Result<T> = std::result::Result<T, WikiseekError>;

/// Errors that can occur in the wikiseek system.
#[derive(Error, Debug)]
pub enum WikiseekError {
    /// Index artifacts missing or unusable; the caller should build first.
    #[error("Index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    /// Search attempted before any index was loaded. Programmer error,
    /// not a retry case.
    #[error("Index not loaded")]
    IndexNotLoaded,

    /// Index artifact exists but cannot be trusted.
    #[error("Corrupt index artifact {path}: {reason}")]
    IndexCorrupt { path: String, reason: String },

    /// Vector file and metadata file disagree on entry count.
    #[error("Index count mismatch: {vectors} vectors vs {chunks} chunks")]
    CountMismatch { vectors: usize, chunks: usize },

    /// Query vector dimension does not match the index.
    #[error("Dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Query refinement error. Always recovered by the engine; surfaced
    /// only from refiner implementations.
    #[error("Refinement error: {message}")]
    Refinement { message: String },

    /// Search history database error.
    #[error("History error: {message}")]
    History { message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WikiseekError {
    /// Create an index-unavailable error.
    pub fn index_unavailable(reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a corrupt-artifact error.
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IndexCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a refinement error.
    pub fn refinement(message: impl Into<String>) -> Self {
        Self::Refinement {
            message: message.into(),
        }
    }

    /// Create a history error.
    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WikiseekError::CountMismatch {
            vectors: 100,
            chunks: 99,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_index_unavailable_message() {
        let err = WikiseekError::index_unavailable("run `wikiseek build` first");
        assert!(err.to_string().contains("build"));
    }
}
