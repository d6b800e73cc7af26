//! # Collections
//!
//! A [`Collection`] is a named set of embeddings produced by one model. It
//! ties the model, the batcher and the content store together:
//!
//! ```text
//! embed / embed_multi ──► Batches ──► EmbeddingModel ──► ContentStore
//! similar*            ──► EmbeddingModel ──► search(scan_entries)
//! ```
//!
//! A handle opened for an unknown name with a model creates its row on the
//! first write. Until then, and after [`Collection::delete`], every read
//! fails with [`CollectionError::NotFound`].

use std::sync::Arc;

use embeddb_embeddings::{
    Batches, Content, ContentHash, Embedding, EmbeddingModel, ModelRegistry, embed_checked,
    embed_multi_checked, ensure_supported, resolve_batch_size,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{CollectionError, Result};
use crate::search::{ScoredEntry, search};
use crate::store::{ContentStore, Metadata, NewEntry};

/// Handle to a named, model-bound collection.
pub struct Collection {
    store: ContentStore,
    name: String,
    model: Arc<dyn EmbeddingModel>,
    id: OnceCell<i64>,
}

impl Collection {
    /// Open a collection by name.
    ///
    /// For an existing collection `model` may be omitted; if given it must
    /// resolve to the model the collection was created with. For an unknown
    /// name `model` is required and the collection is created on first write.
    pub async fn open(
        store: ContentStore,
        registry: &ModelRegistry,
        name: &str,
        model: Option<&str>,
    ) -> Result<Self> {
        match (store.find_collection(name).await?, model) {
            (Some(record), requested) => {
                if let Some(requested) = requested {
                    let requested = registry.resolve_id(requested)?;
                    if requested != record.model_id {
                        return Err(CollectionError::ModelMismatch {
                            collection: record.name,
                            existing: record.model_id,
                            requested: requested.to_string(),
                        });
                    }
                }
                let model = registry.get(&record.model_id)?;
                debug!("Opened collection {name} ({})", record.id);
                Ok(Self {
                    store,
                    name: record.name,
                    model,
                    id: OnceCell::new_with(Some(record.id)),
                })
            }
            (None, Some(model)) => Ok(Self {
                store,
                name: name.to_string(),
                model: registry.get(model)?,
                id: OnceCell::new(),
            }),
            (None, None) => Err(CollectionError::NotFound(format!(
                "collection {name} (no model given to create it)"
            ))),
        }
    }

    /// Create a collection now. Fails with [`CollectionError::DuplicateName`]
    /// if the name is taken.
    pub async fn create(
        store: ContentStore,
        registry: &ModelRegistry,
        name: &str,
        model: &str,
    ) -> Result<Self> {
        let model = registry.get(model)?;
        let record = store.create_collection(name, model.model_id()).await?;
        Ok(Self {
            store,
            name: record.name,
            model,
            id: OnceCell::new_with(Some(record.id)),
        })
    }

    /// Whether a collection with this name exists.
    pub async fn exists(store: &ContentStore, name: &str) -> Result<bool> {
        store.collection_exists(name).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.model
    }

    /// The row id, once the collection exists.
    pub fn id(&self) -> Option<i64> {
        self.id.get().copied()
    }

    /// Number of stored entries.
    pub async fn count(&self) -> Result<u64> {
        let collection_id = self.resolve_id(false).await?;
        self.store.count(collection_id).await
    }

    /// Embed and store one item, replacing any entry with the same id.
    ///
    /// When the stored entry already has identical content its vector is
    /// reused and the model is not called. With `store` the content itself is
    /// kept alongside the vector.
    pub async fn embed(
        &self,
        item_id: &str,
        content: impl Into<Content>,
        metadata: Option<Metadata>,
        store: bool,
    ) -> Result<()> {
        let content = content.into();
        ensure_supported(self.model.as_ref(), &content)?;

        let collection_id = self.resolve_id(true).await?;
        self.check_declared_dimension(collection_id).await?;

        let content_hash = content.content_hash();
        let vector = match self.reusable_vector(collection_id, item_id, &content_hash).await? {
            Some(vector) => {
                debug!("Content of {item_id} unchanged, reusing stored vector");
                vector
            }
            None => embed_checked(self.model.as_ref(), &content).await?,
        };

        self.store
            .upsert_entry(
                collection_id,
                NewEntry {
                    item_id: item_id.to_string(),
                    vector,
                    content: store.then_some(content),
                    content_hash,
                    metadata,
                },
            )
            .await
    }

    /// Embed many `(item_id, content)` pairs in batches. Returns the number
    /// of entries written.
    ///
    /// See [`Collection::embed_multi_with_metadata`].
    pub async fn embed_multi<I, K, C>(
        &self,
        entries: I,
        store: bool,
        batch_size: Option<usize>,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<Content>,
    {
        self.embed_multi_with_metadata(
            entries
                .into_iter()
                .map(|(item_id, content)| (item_id, content, None)),
            store,
            batch_size,
        )
        .await
    }

    /// Embed many `(item_id, content, metadata)` entries in batches. Returns
    /// the number of entries written.
    ///
    /// Input is pulled lazily one batch at a time. Every item of a batch is
    /// checked against the model's input kinds before anything else happens,
    /// so a collection is only created once its first batch is acceptable.
    /// Each batch goes to the model in one call and is written in one
    /// transaction. If a batch fails, the batches before it stay written and
    /// the error is reported as [`CollectionError::BatchFailed`].
    pub async fn embed_multi_with_metadata<I, K, C>(
        &self,
        entries: I,
        store: bool,
        batch_size: Option<usize>,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = (K, C, Option<Metadata>)>,
        K: Into<String>,
        C: Into<Content>,
    {
        let batch_size = resolve_batch_size(
            batch_size,
            self.model.capabilities().preferred_batch_size,
            self.store.config().default_batch_size,
        )?;

        let items = entries.into_iter().map(|(item_id, content, metadata)| {
            let item: (String, Content, Option<Metadata>) =
                (item_id.into(), content.into(), metadata);
            item
        });
        let batches = Batches::new(items, batch_size)?;

        let mut collection_id: Option<i64> = None;
        let mut offset = 0;
        for (batch, items) in batches.enumerate() {
            let len = items.len();
            let failed = |source: CollectionError| CollectionError::BatchFailed {
                batch,
                offset,
                source: Box::new(source),
            };

            // Reused vectors skip the model, so kinds are checked here.
            for (_, content, _) in &items {
                ensure_supported(self.model.as_ref(), content)
                    .map_err(|e| failed(e.into()))?;
            }

            let id = match collection_id {
                Some(id) => id,
                None => {
                    let id = self.resolve_id(true).await?;
                    self.check_declared_dimension(id).await?;
                    collection_id = Some(id);
                    id
                }
            };

            self.write_batch(id, items, store).await.map_err(failed)?;
            offset += len;
        }

        info!(
            "Embedded {offset} items into {} in batches of {batch_size}",
            self.name
        );
        Ok(offset)
    }

    /// Entries most similar to `query`, embedded with this collection's model.
    pub async fn similar(
        &self,
        query: impl Into<Content>,
        number: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let collection_id = self.resolve_id(false).await?;
        let vector = embed_checked(self.model.as_ref(), &query.into()).await?;
        search(&self.store, collection_id, &vector, number, None).await
    }

    /// Entries most similar to the stored item `item_id`, excluding itself.
    pub async fn similar_by_id(&self, item_id: &str, number: usize) -> Result<Vec<ScoredEntry>> {
        let collection_id = self.resolve_id(false).await?;
        let entry = self.store.get_entry(collection_id, item_id).await?;
        search(&self.store, collection_id, &entry.vector, number, Some(item_id)).await
    }

    /// Entries most similar to a raw vector, optionally skipping one id.
    pub async fn similar_by_vector(
        &self,
        vector: &[f32],
        number: usize,
        skip_id: Option<&str>,
    ) -> Result<Vec<ScoredEntry>> {
        let collection_id = self.resolve_id(false).await?;
        if let Some(expected) = self.store.dimension(collection_id).await?
            && expected != vector.len()
        {
            return Err(CollectionError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        search(&self.store, collection_id, vector, number, skip_id).await
    }

    /// Delete the collection and all of its entries.
    pub async fn delete(&self) -> Result<()> {
        let collection_id = self.resolve_id(false).await?;
        self.store.delete_collection(collection_id).await
    }

    /// Id of the collection row, looking it up (and with `create`, inserting
    /// it) on first use.
    async fn resolve_id(&self, create: bool) -> Result<i64> {
        if let Some(id) = self.id.get() {
            return Ok(*id);
        }

        let record = match self.store.find_collection(&self.name).await? {
            Some(record) => record,
            None if create => {
                match self
                    .store
                    .create_collection(&self.name, self.model.model_id())
                    .await
                {
                    Ok(record) => record,
                    // Another handle created it first.
                    Err(CollectionError::DuplicateName(_)) => {
                        self.store.get_collection(&self.name).await?
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                return Err(CollectionError::NotFound(format!(
                    "collection {}",
                    self.name
                )));
            }
        };

        if record.model_id != self.model.model_id() {
            return Err(CollectionError::ModelMismatch {
                collection: record.name,
                existing: record.model_id,
                requested: self.model.model_id().to_string(),
            });
        }

        let id = record.id;
        Ok(*self.id.get_or_init(|| async move { id }).await)
    }

    async fn check_declared_dimension(&self, collection_id: i64) -> Result<()> {
        let declared = self.model.capabilities().vector_dimension;
        match self.store.dimension(collection_id).await? {
            Some(stored) if stored != declared => Err(CollectionError::Validation(format!(
                "model {} produces {declared}-dimensional vectors but collection {} holds {stored}-dimensional ones",
                self.model.model_id(),
                self.name
            ))),
            _ => Ok(()),
        }
    }

    async fn reusable_vector(
        &self,
        collection_id: i64,
        item_id: &str,
        content_hash: &ContentHash,
    ) -> Result<Option<Embedding>> {
        if !self.store.config().skip_unchanged {
            return Ok(None);
        }
        let mut existing = self.store.existing_vectors(collection_id, &[item_id]).await?;
        Ok(existing
            .remove(item_id)
            .filter(|(stored, _)| stored == content_hash)
            .map(|(_, vector)| vector))
    }

    async fn write_batch(
        &self,
        collection_id: i64,
        items: Vec<(String, Content, Option<Metadata>)>,
        store: bool,
    ) -> Result<()> {
        let hashes: Vec<ContentHash> = items
            .iter()
            .map(|(_, content, _)| content.content_hash())
            .collect();

        let mut reused: Vec<Option<Embedding>> = vec![None; items.len()];
        if self.store.config().skip_unchanged {
            let ids: Vec<&str> = items.iter().map(|(item_id, _, _)| item_id.as_str()).collect();
            let mut existing = self.store.existing_vectors(collection_id, &ids).await?;
            for (slot, (item_id, hash)) in reused.iter_mut().zip(ids.iter().zip(&hashes)) {
                *slot = existing
                    .remove(*item_id)
                    .filter(|(stored, _)| stored == hash)
                    .map(|(_, vector)| vector);
            }
        }

        let pending: Vec<Content> = items
            .iter()
            .zip(&reused)
            .filter(|(_, reused)| reused.is_none())
            .map(|((_, content, _), _)| content.clone())
            .collect();
        let skipped = items.len() - pending.len();
        if skipped > 0 {
            debug!("Reusing {skipped} unchanged vectors in {}", self.name);
        }
        let mut fresh = embed_multi_checked(self.model.as_ref(), &pending)
            .await?
            .into_iter();

        let mut entries = Vec::with_capacity(items.len());
        for (((item_id, content, metadata), content_hash), reused) in
            items.into_iter().zip(hashes).zip(reused)
        {
            let vector = match reused.or_else(|| fresh.next()) {
                Some(vector) => vector,
                None => {
                    return Err(CollectionError::Validation(format!(
                        "no vector produced for {item_id}"
                    )));
                }
            };
            entries.push(NewEntry {
                item_id,
                vector,
                content: store.then_some(content),
                content_hash,
                metadata,
            });
        }

        self.store.upsert_entries(collection_id, entries).await
    }
}
