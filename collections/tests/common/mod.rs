//! Shared fixtures for the collection integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use embeddb_collections::{
    Content, ContentStore, Embedding, EmbeddingError, EmbeddingModel, Metadata, ModelCapabilities,
    ModelRegistry,
};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Embeds text as the lengths of its first 16 words, zero padded.
pub struct WordLengths {
    id: String,
    preferred_batch_size: Option<usize>,
    embedded: AtomicUsize,
    batches: Mutex<Vec<usize>>,
}

impl WordLengths {
    pub const DIMENSION: usize = 16;

    pub fn new() -> Self {
        Self::named("word-lengths")
    }

    pub fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            preferred_batch_size: None,
            embedded: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_preferred_batch_size(mut self, batch_size: usize) -> Self {
        self.preferred_batch_size = Some(batch_size);
        self
    }

    /// Items sent to the model so far.
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    /// Sizes of the multi-item calls received so far.
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn vector(text: &str) -> Embedding {
        let mut vector: Embedding = text
            .split_whitespace()
            .take(Self::DIMENSION)
            .map(|word| word.len() as f32)
            .collect();
        vector.resize(Self::DIMENSION, 0.0);
        vector
    }

    fn embed_one(&self, content: &Content) -> embeddb_embeddings::Result<Embedding> {
        self.embedded.fetch_add(1, Ordering::SeqCst);
        let text = content
            .as_text()
            .ok_or_else(|| anyhow::anyhow!("word-lengths only embeds text"))?;
        Ok(Self::vector(text))
    }
}

#[async_trait]
impl EmbeddingModel for WordLengths {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> ModelCapabilities {
        let capabilities = ModelCapabilities::text(Self::DIMENSION);
        match self.preferred_batch_size {
            Some(size) => capabilities.with_preferred_batch_size(size),
            None => capabilities,
        }
    }

    async fn embed(&self, content: &Content) -> embeddb_embeddings::Result<Embedding> {
        self.embed_one(content)
    }

    async fn embed_multi(&self, contents: &[Content]) -> embeddb_embeddings::Result<Vec<Embedding>> {
        self.batches.lock().unwrap().push(contents.len());
        contents.iter().map(|content| self.embed_one(content)).collect()
    }
}

/// Returns a fixed vector for each known text.
pub struct FixedVectors {
    dimension: usize,
    vectors: HashMap<String, Embedding>,
}

impl FixedVectors {
    pub fn new(vectors: &[(&str, Vec<f32>)]) -> Self {
        let dimension = vectors.first().map_or(0, |(_, vector)| vector.len());
        Self {
            dimension,
            vectors: vectors
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingModel for FixedVectors {
    fn model_id(&self) -> &str {
        "fixed"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::text(self.dimension)
    }

    async fn embed(&self, content: &Content) -> embeddb_embeddings::Result<Embedding> {
        let text = content.as_text().unwrap_or_default();
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::Model(anyhow::anyhow!("no vector for {text}")))
    }
}

/// Answers the first `healthy_calls` multi-item calls correctly, then drops
/// one vector from every later answer.
pub struct DropsVectors {
    healthy_calls: usize,
    calls: AtomicUsize,
}

impl DropsVectors {
    pub fn after(healthy_calls: usize) -> Self {
        Self {
            healthy_calls,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingModel for DropsVectors {
    fn model_id(&self) -> &str {
        "drops-vectors"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::text(2)
    }

    async fn embed(&self, _content: &Content) -> embeddb_embeddings::Result<Embedding> {
        Ok(vec![1.0, 1.0])
    }

    async fn embed_multi(&self, contents: &[Content]) -> embeddb_embeddings::Result<Vec<Embedding>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let returned = if call < self.healthy_calls {
            contents.len()
        } else {
            contents.len().saturating_sub(1)
        };
        Ok(vec![vec![1.0, 1.0]; returned])
    }
}

/// An in-memory store plus a registry holding a [`WordLengths`] model
/// (alias `demo`).
pub struct Fixture {
    pub store: ContentStore,
    pub registry: ModelRegistry,
    pub words: Arc<WordLengths>,
}

pub async fn fixture() -> Fixture {
    fixture_with(WordLengths::new()).await
}

pub async fn fixture_with(words: WordLengths) -> Fixture {
    init_tracing();
    let words = Arc::new(words);
    let registry = ModelRegistry::builder()
        .register(words.clone())
        .alias("demo", words.model_id())
        .build()
        .unwrap();
    Fixture {
        store: ContentStore::in_memory().await.unwrap(),
        registry,
        words,
    }
}

pub fn metadata(value: serde_json::Value) -> Metadata {
    value.as_object().cloned().unwrap()
}
