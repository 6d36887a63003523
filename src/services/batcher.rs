//! Batched embedding with per-batch failure isolation.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::EmbeddingError;
use crate::models::{IndexingConfig, PacingConfig};
use crate::services::embedding::Embedder;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Inputs above this count are embedded with `reduced_batch_size`.
    pub large_input_threshold: usize,
    pub reduced_batch_size: usize,
    /// Pause after every batch.
    pub pause: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            large_input_threshold: 100,
            reduced_batch_size: 2,
            pause: Duration::ZERO,
        }
    }
}

impl BatchOptions {
    pub fn from_config(indexing: &IndexingConfig, pacing: &PacingConfig) -> Self {
        Self {
            large_input_threshold: indexing.large_input_threshold,
            reduced_batch_size: indexing.reduced_batch_size.max(1),
            pause: pacing.embedding_pause(),
        }
    }

    /// Batch size actually used for `count` inputs.
    pub fn effective_batch_size(&self, count: usize, requested: usize) -> usize {
        let requested = requested.max(1);
        if count > self.large_input_threshold && requested > self.reduced_batch_size {
            self.reduced_batch_size
        } else {
            requested
        }
    }
}

/// A batch whose vectors were replaced by zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Index of the first passage of the batch.
    pub start: usize,
    pub len: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchEmbedding {
    /// One vector per input passage, in input order.
    pub vectors: Vec<Vec<f32>>,
    pub failures: Vec<BatchFailure>,
}

pub struct EmbeddingBatcher<'a> {
    embedder: &'a dyn Embedder,
    options: BatchOptions,
}

impl<'a> EmbeddingBatcher<'a> {
    pub fn new(embedder: &'a dyn Embedder, options: BatchOptions) -> Self {
        Self { embedder, options }
    }

    /// Embed every passage. A batch that fails, returns the wrong number of
    /// vectors or vectors of the wrong length is substituted with zero
    /// vectors and reported in `failures`; only an embedder without a usable
    /// dimension is an error.
    pub async fn embed_all(
        &self,
        passages: &[String],
        batch_size: usize,
    ) -> Result<BatchEmbedding, EmbeddingError> {
        let dimension = self.embedder.dimension();
        if dimension == 0 {
            return Err(EmbeddingError::InvalidDimension(dimension));
        }

        let batch_size = self
            .options
            .effective_batch_size(passages.len(), batch_size);
        let mut result = BatchEmbedding {
            vectors: Vec::with_capacity(passages.len()),
            failures: Vec::new(),
        };

        for (batch_idx, batch) in passages.chunks(batch_size).enumerate() {
            let start = batch_idx * batch_size;
            self.embedder.release_resources();

            match self.embed_batch(batch, dimension).await {
                Ok(vectors) => {
                    debug!(start, len = batch.len(), "embedded batch");
                    result.vectors.extend(vectors);
                }
                Err(error) => {
                    warn!(start, len = batch.len(), "embedding batch failed, using zero vectors: {error}");
                    result
                        .vectors
                        .extend(std::iter::repeat_n(vec![0.0; dimension], batch.len()));
                    result.failures.push(BatchFailure {
                        start,
                        len: batch.len(),
                        error,
                    });
                }
            }

            self.embedder.release_resources();
            if !self.options.pause.is_zero() {
                tokio::time::sleep(self.options.pause).await;
            }
        }

        self.embedder.release_resources();
        Ok(result)
    }

    async fn embed_batch(&self, batch: &[String], dimension: usize) -> Result<Vec<Vec<f32>>, String> {
        let vectors = self.embedder.embed(batch).await.map_err(|e| e.to_string())?;

        if vectors.len() != batch.len() {
            return Err(format!(
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                batch.len()
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(format!(
                "embedder returned a vector of length {}, expected {}",
                bad.len(),
                dimension
            ));
        }
        Ok(vectors)
    }
}
