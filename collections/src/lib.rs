//! # Embedding Collections
//!
//! Persistent, named collections of embeddings with brute-force similarity
//! search, stored in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Collection                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Batches    │  │  Embedding   │  │    Model     │           │
//! │  │              │  │    Model     │  │   Registry   │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐       ┌──────────────┐        │
//! │                  │   Content    │──────►│  Similarity  │        │
//! │                  │    Store     │ scan  │    Search    │        │
//! │                  └──────────────┘       └──────────────┘        │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                       SQLite                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use embeddb_collections::{Collection, ContentStore, StoreConfig};
//!
//! let store = ContentStore::open(&StoreConfig::default()).await?;
//! let docs = Collection::open(store, &registry, "docs", Some("mini-lm")).await?;
//!
//! docs.embed("readme", "Persistent embeddings in SQLite", None, true).await?;
//! let hits = docs.similar("where are vectors stored?", 5).await?;
//! ```

pub mod collection;
pub mod config;
pub mod error;
pub mod migrations;
pub mod search;
pub mod store;

pub use collection::Collection;
pub use config::StoreConfig;
pub use error::{CollectionError, Result};
pub use search::ScoredEntry;
pub use store::{
    CollectionRecord, CollectionSummary, ContentStore, EmbeddingEntry, Metadata, NewEntry,
};

// Re-export from dependencies for convenience
pub use embeddb_embeddings::{
    Content, ContentKind, Embedding, EmbeddingError, EmbeddingModel, ModelCapabilities,
    ModelRegistry,
};
