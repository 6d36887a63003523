//! Embedding backends.
//!
//! The indexing core only sees the [`Embedder`] trait; the HTTP client and the
//! in-process ONNX model are selected from configuration.

mod http;
mod onnx;

pub use http::HttpEmbedder;
pub use onnx::OnnxEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingBackend, EmbeddingConfig};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed passages for indexing, one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Release checkpoint between batches; backends holding reusable buffers
    /// drop them here.
    fn release_resources(&self) {}

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }

    fn describe(&self) -> String;
}

/// Build the embedder selected by `config.backend`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.backend {
        EmbeddingBackend::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
        EmbeddingBackend::Onnx => {
            let model_dir = config.model_dir.as_deref().ok_or_else(|| {
                EmbeddingError::ModelError(
                    "embedding.model_dir must be set for the onnx backend".to_string(),
                )
            })?;
            Ok(Arc::new(OnnxEmbedder::load(config, model_dir)?))
        }
    }
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
