//! # Content Store
//!
//! Durable storage of collections and their embedding rows in SQLite.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE collections (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused
//!     name TEXT NOT NULL UNIQUE,
//!     model TEXT NOT NULL
//! );
//!
//! CREATE TABLE embeddings (
//!     collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
//!     id TEXT NOT NULL,
//!     embedding BLOB NOT NULL,      -- packed little-endian f32
//!     content TEXT,
//!     content_hash BLOB NOT NULL,   -- sha256 of the content bytes
//!     metadata TEXT,                -- JSON object
//!     updated INTEGER NOT NULL,     -- epoch milliseconds
//!     content_blob BLOB,
//!     PRIMARY KEY (collection_id, id)
//! );
//! ```
//!
//! Every write runs in a transaction. Deleting an absent collection is an
//! error ([`CollectionError::NotFound`]), never a silent no-op.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use embeddb_embeddings::{Content, ContentHash, Embedding};
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{CollectionError, Result};
use crate::migrations;

/// Arbitrary key/value metadata attached to an entry.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Upper bound on bound parameters per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

const ENTRY_COLUMNS: &str =
    "collection_id, id, embedding, content, content_blob, content_hash, metadata, updated";

const UPSERT_ENTRY: &str = r#"
    INSERT INTO embeddings (
        collection_id, id, embedding, content, content_blob, content_hash, metadata, updated
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (collection_id, id) DO UPDATE SET
        embedding = excluded.embedding,
        content = excluded.content,
        content_blob = excluded.content_blob,
        content_hash = excluded.content_hash,
        metadata = excluded.metadata,
        updated = MAX(excluded.updated, embeddings.updated + 1)
"#;

/// A row of the `collections` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: i64,
    pub name: String,
    pub model_id: String,
}

/// A collection with its entry count, as listed by
/// [`ContentStore::list_collections`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub name: String,
    pub model_id: String,
    pub entries: u64,
}

/// An entry to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub item_id: String,
    pub vector: Embedding,
    /// Original content, present only when the caller asked to store it.
    pub content: Option<Content>,
    pub content_hash: ContentHash,
    pub metadata: Option<Metadata>,
}

/// A stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingEntry {
    pub collection_id: i64,
    pub item_id: String,
    pub vector: Embedding,
    pub content: Option<Content>,
    pub content_hash: ContentHash,
    pub metadata: Option<Metadata>,
    pub updated: DateTime<Utc>,
}

/// SQLite-backed store for collections and embeddings.
#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
    config: Arc<StoreConfig>,
}

impl ContentStore {
    /// Open (creating if missing) the database described by `config` and
    /// bring its schema up to date.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(
            "Opening embedding store: {}",
            config.database_path.display()
        );

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        Self::connect(options, config.clone()).await
    }

    /// Connect with explicit SQLite options. Foreign keys are always enabled.
    pub async fn connect(options: SqliteConnectOptions, config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options.foreign_keys(true))
            .await?;

        Self::from_pool(pool, config).await
    }

    /// A private in-memory store with default settings.
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with(StoreConfig::new(":memory:")).await
    }

    /// A private in-memory store using the non-path settings of `config`.
    pub async fn in_memory_with(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        // A single connection that never expires: the database lives and dies
        // with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, config).await
    }

    /// Wrap an existing pool and run migrations on it.
    pub async fn from_pool(pool: SqlitePool, config: StoreConfig) -> Result<Self> {
        migrations::migrate(&pool).await?;
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying pool for running queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a collection. Fails with [`CollectionError::DuplicateName`] if
    /// the name is taken.
    pub async fn create_collection(&self, name: &str, model_id: &str) -> Result<CollectionRecord> {
        let result = sqlx::query("INSERT INTO collections (name, model) VALUES (?, ?)")
            .bind(name)
            .bind(model_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                info!("Created collection {name} for model {model_id}");
                Ok(CollectionRecord {
                    id: done.last_insert_rowid(),
                    name: name.to_string(),
                    model_id: model_id.to_string(),
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CollectionError::DuplicateName(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a collection by name.
    pub async fn get_collection(&self, name: &str) -> Result<CollectionRecord> {
        self.find_collection(name)
            .await?
            .ok_or_else(|| CollectionError::NotFound(format!("collection {name}")))
    }

    /// Look up a collection by name, `None` if absent.
    pub async fn find_collection(&self, name: &str) -> Result<Option<CollectionRecord>> {
        let row = sqlx::query("SELECT id, name, model FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(CollectionRecord {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                model_id: row.try_get("model")?,
            })
        })
        .transpose()
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.find_collection(name).await?.is_some())
    }

    /// All collections ordered by name, with their entry counts.
    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT c.name AS name, c.model AS model, COUNT(e.id) AS entries
            FROM collections c
            LEFT JOIN embeddings e ON e.collection_id = c.id
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let entries: i64 = row.try_get("entries")?;
            summaries.push(CollectionSummary {
                name: row.try_get("name")?,
                model_id: row.try_get("model")?,
                entries: entries.unsigned_abs(),
            });
        }
        Ok(summaries)
    }

    /// Insert or replace one entry atomically.
    pub async fn upsert_entry(&self, collection_id: i64, entry: NewEntry) -> Result<()> {
        self.upsert_entries(collection_id, vec![entry]).await
    }

    /// Insert or replace several entries in a single transaction.
    ///
    /// Either every entry is written or none is. Vectors must match each
    /// other and the collection's established dimension.
    pub async fn upsert_entries(&self, collection_id: i64, entries: Vec<NewEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        ensure_collection(&mut *tx, collection_id).await?;

        let expected = match stored_dimension(&mut *tx, collection_id).await? {
            Some(dimension) => dimension,
            None => entries[0].vector.len(),
        };

        let now = Utc::now().timestamp_millis();
        for entry in &entries {
            if entry.vector.len() != expected {
                return Err(CollectionError::DimensionMismatch {
                    expected,
                    actual: entry.vector.len(),
                });
            }

            let metadata = entry
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let (text, blob) = match &entry.content {
                Some(Content::Text(text)) => (Some(text.as_str()), None),
                Some(Content::Binary(bytes)) => (None, Some(bytes.as_slice())),
                None => (None, None),
            };

            sqlx::query(UPSERT_ENTRY)
                .bind(collection_id)
                .bind(&entry.item_id)
                .bind(encode_vector(&entry.vector))
                .bind(text)
                .bind(blob)
                .bind(&entry.content_hash[..])
                .bind(metadata)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(
            "Upserted {} entries into collection {collection_id}",
            entries.len()
        );
        Ok(())
    }

    /// Fetch one entry.
    pub async fn get_entry(&self, collection_id: i64, item_id: &str) -> Result<EmbeddingEntry> {
        ensure_collection(&self.pool, collection_id).await?;

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM embeddings WHERE collection_id = ? AND id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(collection_id)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_entry(&row),
            None => Err(CollectionError::NotFound(format!("item {item_id}"))),
        }
    }

    /// Stream every entry of a collection, ordered by item id.
    ///
    /// Each call runs a fresh query; rows are decoded as they are pulled.
    pub async fn scan_entries(
        &self,
        collection_id: i64,
    ) -> Result<BoxStream<'_, Result<EmbeddingEntry>>> {
        ensure_collection(&self.pool, collection_id).await?;

        let stream = sqlx::query(SCAN_ENTRIES)
            .bind(collection_id)
            .fetch(&self.pool)
            .map(|row| row.map_err(CollectionError::from).and_then(|row| row_to_entry(&row)))
            .boxed();
        Ok(stream)
    }

    /// Stored hash and vector for each of `item_ids` that exists.
    pub async fn existing_vectors(
        &self,
        collection_id: i64,
        item_ids: &[&str],
    ) -> Result<HashMap<String, (ContentHash, Embedding)>> {
        let mut found = HashMap::new();
        for chunk in item_ids.chunks(LOOKUP_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "SELECT id, embedding, content_hash FROM embeddings WHERE collection_id = ",
            );
            builder.push_bind(collection_id);
            builder.push(" AND id IN (");
            let mut ids = builder.separated(", ");
            for item_id in chunk {
                ids.push_bind(*item_id);
            }
            ids.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                let item_id: String = row.try_get("id")?;
                let vector = decode_vector(&item_id, row.try_get("embedding")?)?;
                let hash = decode_hash(row.try_get("content_hash")?)?;
                found.insert(item_id, (hash, vector));
            }
        }
        Ok(found)
    }

    /// Length of the vectors stored in a collection, `None` while it is empty.
    pub async fn dimension(&self, collection_id: i64) -> Result<Option<usize>> {
        stored_dimension(&self.pool, collection_id).await
    }

    /// Number of entries in a collection.
    pub async fn count(&self, collection_id: i64) -> Result<u64> {
        ensure_collection(&self.pool, collection_id).await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE collection_id = ?")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.unsigned_abs())
    }

    /// Delete a collection and every entry in it.
    pub async fn delete_collection(&self, collection_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        ensure_collection(&mut *tx, collection_id).await?;

        let removed = sqlx::query("DELETE FROM embeddings WHERE collection_id = ?")
            .bind(collection_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(collection_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Deleted collection {collection_id} with {removed} entries");
        Ok(())
    }
}

const SCAN_ENTRIES: &str = r#"
    SELECT collection_id, id, embedding, content, content_blob, content_hash, metadata, updated
    FROM embeddings
    WHERE collection_id = ?
    ORDER BY id
"#;

async fn ensure_collection<'e, E>(executor: E, collection_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM collections WHERE id = ?")
        .bind(collection_id)
        .fetch_optional(executor)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(CollectionError::NotFound(format!(
            "collection id {collection_id}"
        ))),
    }
}

async fn stored_dimension<'e, E>(executor: E, collection_id: i64) -> Result<Option<usize>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let bytes: Option<i64> =
        sqlx::query_scalar("SELECT length(embedding) FROM embeddings WHERE collection_id = ? LIMIT 1")
            .bind(collection_id)
            .fetch_optional(executor)
            .await?;
    Ok(bytes.map(|bytes| bytes.unsigned_abs() as usize / 4))
}

fn row_to_entry(row: &SqliteRow) -> Result<EmbeddingEntry> {
    let item_id: String = row.try_get("id")?;
    let vector = decode_vector(&item_id, row.try_get("embedding")?)?;

    let text: Option<String> = row.try_get("content")?;
    let bytes: Option<Vec<u8>> = row.try_get("content_blob")?;
    let content = match (text, bytes) {
        (Some(text), _) => Some(Content::Text(text)),
        (None, Some(bytes)) => Some(Content::Binary(bytes)),
        (None, None) => None,
    };

    let metadata: Option<String> = row.try_get("metadata")?;
    let metadata = metadata
        .map(|json| serde_json::from_str::<Metadata>(&json))
        .transpose()?;

    let updated_ms: i64 = row.try_get("updated")?;
    let updated = DateTime::from_timestamp_millis(updated_ms).ok_or_else(|| {
        sqlx::Error::Decode(format!("invalid timestamp {updated_ms} for {item_id}").into())
    })?;

    Ok(EmbeddingEntry {
        collection_id: row.try_get("collection_id")?,
        content_hash: decode_hash(row.try_get("content_hash")?)?,
        item_id,
        vector,
        content,
        metadata,
        updated,
    })
}

/// Pack a vector as little-endian `f32`s.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Unpack a little-endian `f32` blob.
pub fn decode_vector(item_id: &str, blob: Vec<u8>) -> Result<Embedding> {
    if blob.len() % 4 != 0 {
        return Err(CollectionError::CorruptVector {
            item_id: item_id.to_string(),
            len: blob.len(),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn decode_hash(bytes: Vec<u8>) -> Result<ContentHash> {
    ContentHash::try_from(bytes.as_slice()).map_err(|_| {
        sqlx::Error::Decode(format!("content hash has {} bytes", bytes.len()).into()).into()
    })
}
