//! Error types for embedding models and ranking.

use thiserror::Error;

use crate::content::ContentKind;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur while producing or comparing embeddings.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The model does not accept this kind of content.
    #[error("model {model} does not support {kind} input")]
    UnsupportedInput { model: String, kind: ContentKind },

    /// The model returned the wrong number or shape of vectors.
    #[error("model {model} broke its contract: {reason}")]
    ModelContract { model: String, reason: String },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// No model registered under this id or alias.
    #[error("unknown embedding model: {0}")]
    UnknownModel(String),

    /// The model implementation itself failed.
    #[error("model error: {0}")]
    Model(#[from] anyhow::Error),
}
