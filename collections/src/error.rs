//! Error types for collections and the content store.

use embeddb_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Errors that can occur when storing or searching embeddings.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// A collection with this name already exists.
    #[error("collection already exists: {0}")]
    DuplicateName(String),

    /// Collection or item absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Vector length inconsistent with the collection.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The collection is bound to a different model than the one requested.
    #[error("collection {collection} uses model {existing}, not {requested}")]
    ModelMismatch {
        collection: String,
        existing: String,
        requested: String,
    },

    /// Model dispatch or ranking error, surfaced unmodified.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// A batch of `embed_multi` failed; earlier batches stay committed.
    #[error("batch {batch} starting at item {offset} failed: {source}")]
    BatchFailed {
        batch: usize,
        offset: usize,
        #[source]
        source: Box<CollectionError>,
    },

    /// Metadata could not be serialized or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored vector blob is not a whole number of `f32`s.
    #[error("corrupt vector for {item_id}: {len} bytes")]
    CorruptVector { item_id: String, len: usize },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectionError {
    /// The innermost error, looking through [`CollectionError::BatchFailed`].
    pub fn root(&self) -> &CollectionError {
        match self {
            Self::BatchFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }
}
