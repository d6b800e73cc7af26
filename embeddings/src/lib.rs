//! # Embeddings
//!
//! Model-facing half of embeddb: the embedding model capability, the model
//! registry, lazy batching and similarity ranking.
//!
//! ## Features
//!
//! - **Model capability**: [`EmbeddingModel`] with declared capabilities,
//!   checked before every dispatch
//! - **Registry**: explicit lookup of models by id or alias
//! - **Batching**: bounded, order-preserving groups over unbounded input
//! - **Ranking**: cosine similarity with deterministic top-k selection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings                                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Content ──► Batches ──► EmbeddingModel ──► Embedding           │
//! │                              │                  │               │
//! │                              ▼                  ▼               │
//! │                        ModelRegistry          TopK              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod content;
pub mod error;
pub mod model;
pub mod registry;
pub mod similarity;

pub use batch::{Batches, DEFAULT_BATCH_SIZE, resolve_batch_size};
pub use content::{Content, ContentHash, ContentKind};
pub use error::{EmbeddingError, Result};
pub use model::{
    EmbeddingModel, ModelCapabilities, embed_checked, embed_multi_checked, ensure_supported,
};
pub use registry::{ModelRegistry, ModelRegistryBuilder};
pub use similarity::{Ranked, TopK, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
