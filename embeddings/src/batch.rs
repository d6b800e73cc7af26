//! Lazy batching of item streams.
//!
//! [`Batches`] pulls from the wrapped iterator only as each batch is
//! requested, so the input may be arbitrarily long or unbounded.

use crate::error::{EmbeddingError, Result};

/// Batch size used when neither the caller nor the model expresses one.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Pick the effective batch size.
///
/// An explicit override wins over the model's preferred size, which wins over
/// `default`. The model preference is only a hint: an override larger than it
/// is honored. A preference of zero counts as absent.
pub fn resolve_batch_size(
    explicit: Option<usize>,
    model_preferred: Option<usize>,
    default: usize,
) -> Result<usize> {
    match explicit {
        Some(0) => Err(EmbeddingError::Validation(
            "batch size must be positive".to_string(),
        )),
        Some(size) => Ok(size),
        None => match model_preferred {
            Some(size) if size > 0 => Ok(size),
            _ if default == 0 => Err(EmbeddingError::Validation(
                "default batch size must be positive".to_string(),
            )),
            _ => Ok(default),
        },
    }
}

/// Iterator adapter yielding groups of at most `batch_size` items in input
/// order; the last group may be smaller.
#[derive(Debug, Clone)]
pub struct Batches<I> {
    inner: I,
    batch_size: usize,
}

impl<I: Iterator> Batches<I> {
    /// Wrap `items`. Fails if `batch_size` is zero.
    pub fn new(items: impl IntoIterator<IntoIter = I>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(EmbeddingError::Validation(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            inner: items.into_iter(),
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I::Item> = self.inner.by_ref().take(self.batch_size).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        (
            lower.div_ceil(self.batch_size),
            upper.map(|upper| upper.div_ceil(self.batch_size)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_batches_preserve_order() {
        let batches: Vec<Vec<i32>> = Batches::new(1..=7, 3).unwrap().collect();
        assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let batches: Vec<Vec<i32>> = Batches::new(1..=4, 2).unwrap().collect();
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_empty_input() {
        let mut batches = Batches::new(Vec::<i32>::new(), 5).unwrap();
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_unbounded_input_is_pulled_lazily() {
        let mut pulled = 0;
        let source = std::iter::repeat_with(|| {
            pulled += 1;
            pulled
        });
        let first_two: Vec<Vec<i32>> = Batches::new(source, 4).unwrap().take(2).collect();
        assert_eq!(first_two, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            Batches::new(1..3, 0),
            Err(EmbeddingError::Validation(_))
        ));
    }

    #[test]
    fn test_resolution_order() {
        assert_eq!(resolve_batch_size(Some(7), Some(32), 100).unwrap(), 7);
        assert_eq!(resolve_batch_size(None, Some(32), 100).unwrap(), 32);
        assert_eq!(resolve_batch_size(None, None, 100).unwrap(), 100);
        assert_eq!(resolve_batch_size(None, Some(0), 100).unwrap(), 100);
    }

    #[test]
    fn test_model_preference_is_only_a_hint() {
        assert_eq!(resolve_batch_size(Some(50), Some(1), 100).unwrap(), 50);
        assert_eq!(resolve_batch_size(None, Some(1), 100).unwrap(), 1);
    }

    #[test]
    fn test_zero_override_rejected() {
        assert!(resolve_batch_size(Some(0), Some(8), 100).is_err());
    }
}
