//! Brute-force similarity search over a stored collection.

use embeddb_embeddings::{Content, TopK, cosine_similarity};
use futures::TryStreamExt;
use serde::Serialize;
use tracing::debug;

use crate::error::{CollectionError, Result};
use crate::store::{ContentStore, Metadata};

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub item_id: String,
    pub score: f32,
    /// Stored content, if the entry was written with `store = true`.
    pub content: Option<Content>,
    pub metadata: Option<Metadata>,
}

/// Rank every entry of a collection against `query`.
///
/// Entries are pulled from a fresh scan one at a time and only the best
/// `number` are held. Results are ordered by descending score, ties by
/// ascending item id. `exclude` is never returned.
pub async fn search(
    store: &ContentStore,
    collection_id: i64,
    query: &[f32],
    number: usize,
    exclude: Option<&str>,
) -> Result<Vec<ScoredEntry>> {
    if number == 0 {
        return Err(CollectionError::Validation(
            "number of results must be positive".to_string(),
        ));
    }

    let mut top = TopK::new(number);
    let mut scanned = 0usize;
    let mut entries = store.scan_entries(collection_id).await?;
    while let Some(entry) = entries.try_next().await? {
        scanned += 1;
        if exclude == Some(entry.item_id.as_str()) {
            continue;
        }
        let score = cosine_similarity(query, &entry.vector)?;
        top.push(entry.item_id, score, (entry.content, entry.metadata));
    }

    debug!(
        "Ranked {scanned} entries in collection {collection_id}, keeping {}",
        top.len()
    );

    Ok(top
        .into_sorted_vec()
        .into_iter()
        .map(|ranked| {
            let (content, metadata) = ranked.payload;
            ScoredEntry {
                item_id: ranked.id,
                score: ranked.score,
                content,
                metadata,
            }
        })
        .collect())
}
