//! In-process sentence embedding with ONNX Runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::{
    Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams, TruncationStrategy,
};
use tracing::info;

use super::{Embedder, normalize};
use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, Pooling};

/// Third model input besides `input_ids` and `attention_mask`, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtraInput {
    None,
    TokenTypeIds,
    PositionIds,
}

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    extra_input: ExtraInput,
    pooling: Pooling,
    dimension: usize,
}

pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    name: String,
}

fn model_err(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::ModelError(e.to_string())
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelError(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(model_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_err)?
            .with_intra_threads(num_cpus())
            .map_err(model_err)?
            .commit_from_file(&model_path)
            .map_err(model_err)?;

        let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let extra_input = if input_names.contains(&"token_type_ids") {
            ExtraInput::TokenTypeIds
        } else if input_names.contains(&"position_ids") {
            ExtraInput::PositionIds
        } else {
            ExtraInput::None
        };

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(model_err)?;

        // Bound sequence length so a long passage cannot blow up the batch tensor
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(model_err)?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        info!(
            model = %model_path.display(),
            dimension = config.dimension,
            pooling = ?config.pooling,
            "loaded ONNX embedding model"
        );

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                extra_input,
                pooling: config.pooling,
                dimension: config.dimension as usize,
            }),
            name: config.model.clone(),
        })
    }
}

impl OnnxModel {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self.tokenizer.encode_batch(texts, true).map_err(model_err)?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut extra = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let type_ids = encoding.get_type_ids();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                let at = i * max_len + j;
                input_ids[at] = i64::from(id);
                attention_mask[at] = i64::from(m);
                extra[at] = match self.extra_input {
                    ExtraInput::TokenTypeIds => type_ids.get(j).map_or(0, |&t| i64::from(t)),
                    ExtraInput::PositionIds => j as i64,
                    ExtraInput::None => 0,
                };
            }
        }

        let shape = [batch_size, max_len];
        let input_ids = Tensor::from_array((shape, input_ids)).map_err(model_err)?;
        let attention_mask = Tensor::from_array((shape, attention_mask)).map_err(model_err)?;
        let extra = Tensor::from_array((shape, extra)).map_err(model_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::ModelError("session lock poisoned".to_string()))?;

        let outputs = match self.extra_input {
            ExtraInput::TokenTypeIds => session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => extra
            ]),
            ExtraInput::PositionIds => session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "position_ids" => extra
            ]),
            ExtraInput::None => session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ]),
        }
        .map_err(model_err)?;

        let output = outputs[0].try_extract_array::<f32>().map_err(model_err)?;
        self.pool(output, &encodings)
    }

    fn pool(
        &self,
        output: ArrayViewD<'_, f32>,
        encodings: &[Encoding],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let shape = output.shape().to_vec();
        let hidden = *shape.last().unwrap_or(&0);
        if hidden < self.dimension {
            return Err(EmbeddingError::InvalidDimension(hidden));
        }

        match shape.len() {
            // Already pooled: [batch, hidden]
            2 => Ok((0..encodings.len())
                .map(|i| {
                    let v: Vec<f32> = (0..self.dimension).map(|d| output[[i, d]]).collect();
                    normalize(&v)
                })
                .collect()),
            // Token states: [batch, seq, hidden]
            3 => Ok(encodings
                .iter()
                .enumerate()
                .map(|(i, encoding)| {
                    let mask = encoding.get_attention_mask();
                    let v: Vec<f32> = match self.pooling {
                        Pooling::Mean => {
                            let tokens: Vec<usize> = mask
                                .iter()
                                .enumerate()
                                .filter(|&(_, &m)| m == 1)
                                .map(|(j, _)| j)
                                .collect();
                            let count = tokens.len().max(1) as f32;
                            (0..self.dimension)
                                .map(|d| tokens.iter().map(|&j| output[[i, j, d]]).sum::<f32>() / count)
                                .collect()
                        }
                        Pooling::LastToken => {
                            let last = mask.iter().rposition(|&m| m == 1).unwrap_or(0);
                            (0..self.dimension).map(|d| output[[i, last, d]]).collect()
                        }
                    };
                    normalize(&v)
                })
                .collect()),
            _ => Err(EmbeddingError::ModelError(format!(
                "unexpected output shape: {:?}",
                shape
            ))),
        }
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.model.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed(texts))
            .await
            .map_err(|e| EmbeddingError::ModelError(format!("inference task failed: {e}")))?
    }

    fn describe(&self) -> String {
        format!("onnx ({})", self.name)
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxEmbedder::load(&EmbeddingConfig::default(), dir.path());
        assert!(matches!(result, Err(EmbeddingError::ModelError(msg)) if msg.contains("model not found")));
    }
}
