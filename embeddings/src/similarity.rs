//! Similarity computation and top-k ranking.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors, or either vector has zero magnitude
/// - -1.0 means opposite vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

/// A scored candidate. Orders by score, then by *descending* id, so that the
/// greater of two candidates is the one ranked first.
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub id: String,
    pub score: f32,
    pub payload: T,
}

impl<T> Ranked<T> {
    fn key(&self) -> (OrderedFloat<f32>, Reverse<&str>) {
        (OrderedFloat(self.score), Reverse(self.id.as_str()))
    }
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for Ranked<T> {}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Keeps the best `limit` candidates seen so far.
///
/// Results come out by descending score with ties broken by ascending id, so
/// the output is deterministic for a fixed candidate set.
pub struct TopK<T> {
    limit: usize,
    heap: BinaryHeap<Reverse<Ranked<T>>>,
}

impl<T> TopK<T> {
    /// Create a ranker keeping at most `limit` results. The heap grows with
    /// the candidates actually pushed, so `limit` may exceed any real count.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            heap: BinaryHeap::new(),
        }
    }

    /// Offer a candidate.
    pub fn push(&mut self, id: impl Into<String>, score: f32, payload: T) {
        self.heap.push(Reverse(Ranked {
            id: id.into(),
            score,
            payload,
        }));
        if self.heap.len() > self.limit {
            // The root of the min-heap is the worst candidate kept.
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best candidates first.
    pub fn into_sorted_vec(self) -> Vec<Ranked<T>> {
        // Ascending order of Reverse is descending order of Ranked.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(ranked)| ranked)
            .collect()
    }
}
