//! Integration tests for similarity queries.

mod common;

use std::sync::Arc;

use common::{FixedVectors, WordLengths, fixture};
use embeddb_collections::{Collection, CollectionError, ContentStore, ModelRegistry};
use embeddb_embeddings::cosine_similarity;
use pretty_assertions::assert_eq;

const HOUND: [f32; 3] = [0.9, 0.1, 0.1];
const CAT: [f32; 3] = [0.1, 0.9, 0.1];

async fn entries_collection() -> (ContentStore, Collection) {
    common::init_tracing();
    let registry = ModelRegistry::builder()
        .register(Arc::new(FixedVectors::new(&[
            ("hound", HOUND.to_vec()),
            ("cat", CAT.to_vec()),
            ("dog", vec![0.8, 0.2, 0.1]),
        ])))
        .build()
        .unwrap();
    let store = ContentStore::in_memory().await.unwrap();
    let entries = Collection::open(store.clone(), &registry, "entries", Some("fixed"))
        .await
        .unwrap();
    (store, entries)
}

fn ids(results: &[embeddb_collections::ScoredEntry]) -> Vec<&str> {
    results.iter().map(|r| r.item_id.as_str()).collect()
}

#[tokio::test]
async fn test_hound_is_closest_to_cat() {
    let (_store, entries) = entries_collection().await;
    entries.embed("hound", "hound", None, false).await.unwrap();
    entries.embed("cat", "cat", None, false).await.unwrap();

    let results = entries.similar_by_id("hound", 1).await.unwrap();

    assert_eq!(ids(&results), vec!["cat"]);
    let expected = cosine_similarity(&HOUND, &CAT).unwrap();
    assert!((results[0].score - expected).abs() < 1e-6);
}

#[tokio::test]
async fn test_similar_by_id_never_returns_itself() {
    let (_store, entries) = entries_collection().await;
    entries
        .embed_multi([("hound", "hound"), ("cat", "cat"), ("dog", "dog")], false, None)
        .await
        .unwrap();

    for item_id in ["hound", "cat", "dog"] {
        let results = entries.similar_by_id(item_id, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.item_id != item_id));
    }

    let results = entries.similar_by_id("hound", 10).await.unwrap();
    assert_eq!(ids(&results), vec!["dog", "cat"]);
}

#[tokio::test]
async fn test_similar_by_missing_id() {
    let (_store, entries) = entries_collection().await;
    entries.embed("cat", "cat", None, false).await.unwrap();

    let err = entries.similar_by_id("unicorn", 3).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_similar_embeds_the_query() {
    let fx = fixture().await;
    let docs = Collection::open(fx.store.clone(), &fx.registry, "docs", Some("demo"))
        .await
        .unwrap();
    docs.embed_multi(
        [
            ("tiny", "a b c"),
            ("mixed", "hello there my friend"),
            ("long", "extraordinarily verbose"),
        ],
        true,
        None,
    )
    .await
    .unwrap();

    let results = docs.similar("howdy folks", 2).await.unwrap();

    assert_eq!(ids(&results), vec!["long", "tiny"]);
    assert_eq!(
        results[0].content,
        Some(embeddb_collections::Content::text("extraordinarily verbose"))
    );
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn test_ties_break_by_item_id_deterministically() {
    let fx = fixture().await;
    let docs = Collection::open(fx.store.clone(), &fx.registry, "docs", Some("demo"))
        .await
        .unwrap();
    // Same word lengths, so identical vectors.
    docs.embed_multi(
        [
            ("delta", "ab cd"),
            ("alpha", "ef gh"),
            ("charlie", "ij kl"),
            ("bravo", "mn op"),
            ("other", "abcdefgh a"),
        ],
        false,
        None,
    )
    .await
    .unwrap();

    let query = WordLengths::vector("xy zw");
    let first = docs.similar_by_vector(&query, 3, None).await.unwrap();
    assert_eq!(ids(&first), vec!["alpha", "bravo", "charlie"]);

    for _ in 0..3 {
        let again = docs.similar_by_vector(&query, 3, None).await.unwrap();
        assert_eq!(again, first);
    }

    let skipped = docs.similar_by_vector(&query, 3, Some("alpha")).await.unwrap();
    assert_eq!(ids(&skipped), vec!["bravo", "charlie", "delta"]);
}

#[tokio::test]
async fn test_wrong_dimension_fails_before_scan() {
    let (store, entries) = entries_collection().await;
    entries.embed("hound", "hound", None, false).await.unwrap();

    // A row whose metadata cannot be decoded: any scan would trip over it.
    sqlx::query("UPDATE embeddings SET metadata = 'not json' WHERE id = 'hound'")
        .execute(store.pool())
        .await
        .unwrap();

    let err = entries
        .similar_by_vector(&[1.0, 0.0], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CollectionError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));

    let err = entries
        .similar_by_vector(&[1.0, 0.0, 0.0], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::Serialization(_)));
}

#[tokio::test]
async fn test_zero_results_rejected() {
    let (_store, entries) = entries_collection().await;
    entries.embed("cat", "cat", None, false).await.unwrap();

    let err = entries.similar_by_vector(&CAT, 0, None).await.unwrap_err();
    assert!(matches!(err, CollectionError::Validation(_)));
}

#[tokio::test]
async fn test_unbounded_number_returns_every_entry() {
    let (_store, entries) = entries_collection().await;
    entries
        .embed_multi([("hound", "hound"), ("cat", "cat"), ("dog", "dog")], false, None)
        .await
        .unwrap();

    let results = entries
        .similar_by_vector(&HOUND, usize::MAX, None)
        .await
        .unwrap();
    assert_eq!(ids(&results), vec!["hound", "dog", "cat"]);

    let results = entries.similar_by_id("cat", usize::MAX).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(ids(&results)[1], "hound");
}
