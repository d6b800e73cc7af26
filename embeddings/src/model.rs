//! The embedding model capability.
//!
//! Models are supplied by the caller; this crate only defines the interface
//! and the checked dispatch that enforces each model's declared contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::content::{Content, ContentKind};
use crate::error::{EmbeddingError, Result};

/// What a model declares about itself at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Whether the model accepts text content.
    pub supports_text: bool,

    /// Whether the model accepts binary content.
    pub supports_binary: bool,

    /// Batch size the model works best with, if any. A hint, not a ceiling.
    pub preferred_batch_size: Option<usize>,

    /// Length of every vector the model produces.
    pub vector_dimension: usize,
}

impl ModelCapabilities {
    /// Capabilities of a text-only model.
    pub fn text(vector_dimension: usize) -> Self {
        Self {
            supports_text: true,
            supports_binary: false,
            preferred_batch_size: None,
            vector_dimension,
        }
    }

    /// Capabilities of a binary-only model.
    pub fn binary(vector_dimension: usize) -> Self {
        Self {
            supports_text: false,
            supports_binary: true,
            preferred_batch_size: None,
            vector_dimension,
        }
    }

    /// Also accept binary content.
    pub fn with_binary(mut self) -> Self {
        self.supports_binary = true;
        self
    }

    /// Declare a preferred batch size.
    pub fn with_preferred_batch_size(mut self, batch_size: usize) -> Self {
        self.preferred_batch_size = Some(batch_size);
        self
    }

    /// Check whether content of the given kind is accepted.
    pub fn supports(&self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Text => self.supports_text,
            ContentKind::Binary => self.supports_binary,
        }
    }
}

/// Trait for embedding models.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Stable identifier of this model, recorded on every collection it feeds.
    fn model_id(&self) -> &str;

    /// Declared capabilities.
    fn capabilities(&self) -> ModelCapabilities;

    /// Generate an embedding for a single piece of content.
    async fn embed(&self, content: &Content) -> Result<Embedding>;

    /// Generate embeddings for several pieces of content, same length and
    /// order as the input.
    async fn embed_multi(&self, contents: &[Content]) -> Result<Vec<Embedding>> {
        // Default implementation: process sequentially
        let mut results = Vec::with_capacity(contents.len());
        for content in contents {
            results.push(self.embed(content).await?);
        }
        Ok(results)
    }
}

/// Fail with [`EmbeddingError::UnsupportedInput`] if `model` does not accept
/// `content`.
pub fn ensure_supported(model: &dyn EmbeddingModel, content: &Content) -> Result<()> {
    let kind = content.kind();
    if model.capabilities().supports(kind) {
        Ok(())
    } else {
        Err(EmbeddingError::UnsupportedInput {
            model: model.model_id().to_string(),
            kind,
        })
    }
}

/// Embed one piece of content, checking the input kind before dispatch and
/// the vector shape after.
pub async fn embed_checked(model: &dyn EmbeddingModel, content: &Content) -> Result<Embedding> {
    ensure_supported(model, content)?;
    let embedding = model.embed(content).await?;
    check_shape(model, &embedding)?;
    Ok(embedding)
}

/// Embed several pieces of content in one model call.
///
/// Every input is checked before the model is called. The model must return
/// exactly one vector per input, each of the declared dimension; anything
/// else is a [`EmbeddingError::ModelContract`] error.
pub async fn embed_multi_checked(
    model: &dyn EmbeddingModel,
    contents: &[Content],
) -> Result<Vec<Embedding>> {
    for content in contents {
        ensure_supported(model, content)?;
    }
    if contents.is_empty() {
        return Ok(Vec::new());
    }

    debug!(
        "Embedding {} items with model: {}",
        contents.len(),
        model.model_id()
    );

    let embeddings = model.embed_multi(contents).await?;
    if embeddings.len() != contents.len() {
        return Err(EmbeddingError::ModelContract {
            model: model.model_id().to_string(),
            reason: format!(
                "returned {} vectors for {} inputs",
                embeddings.len(),
                contents.len()
            ),
        });
    }
    for embedding in &embeddings {
        check_shape(model, embedding)?;
    }
    Ok(embeddings)
}

fn check_shape(model: &dyn EmbeddingModel, embedding: &Embedding) -> Result<()> {
    let expected = model.capabilities().vector_dimension;
    if embedding.len() != expected {
        return Err(EmbeddingError::ModelContract {
            model: model.model_id().to_string(),
            reason: format!(
                "returned a vector of length {}, declared {expected}",
                embedding.len()
            ),
        });
    }
    // NaN or infinite components would make every score against them
    // meaningless.
    if let Some(position) = embedding.iter().position(|value| !value.is_finite()) {
        return Err(EmbeddingError::ModelContract {
            model: model.model_id().to_string(),
            reason: format!("returned a non-finite value at position {position}"),
        });
    }
    Ok(())
}
