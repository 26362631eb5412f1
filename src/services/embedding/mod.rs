//! Embedding providers.
//!
//! The retrieval core only sees the [`Embedder`] trait, so the in-process ONNX
//! model, a remote embeddings server and test fakes are interchangeable.

mod http;
mod onnx;

pub use http::HttpEmbedder;
pub use onnx::OnnxEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{Config, EmbeddingConfig, EmbeddingProvider};

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic for identical input within one
/// process and must return exactly one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_many(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Human-readable identifier, e.g. the model id.
    fn name(&self) -> &str;
}

pub type SharedEmbedder = Arc<dyn Embedder>;

/// Create the embedder selected in the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<SharedEmbedder, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Onnx => {
            let model_dir = match config.model_path.clone() {
                Some(path) => path,
                None => Config::models_dir()
                    .map(|dir| dir.join(model_dir_name(&config.model_id)))
                    .ok_or_else(|| {
                        EmbeddingError::Model(crate::error::ModelError::NotFound(
                            "could not determine models directory".to_string(),
                        ))
                    })?,
            };
            Ok(Arc::new(OnnxEmbedder::load(config, &model_dir)?))
        }
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
    }
}

/// Directory name used for a model id under the models directory.
pub fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

/// Check that a provider answered with one `dimension`-long vector per input.
pub(crate) fn check_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected_count} embeddings, got {}",
            embeddings.len()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {dimension}-d embeddings, got {}-d",
            bad.len()
        )));
    }
    Ok(())
}

/// L2-normalize a vector, leaving the zero vector untouched.
pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
