//! In-process sentence embedding model running on ONNX Runtime.
//!
//! Expects a sentence-transformers export (`model.onnx` + `tokenizer.json`)
//! such as `all-MiniLM-L6-v2`. Token embeddings are mean-pooled over the
//! attention mask and L2-normalized.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use super::{Embedder, check_embeddings, normalize};
use crate::error::{EmbeddingError, ModelError};
use crate::models::EmbeddingConfig;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_id: String,
    dimension: usize,
    batch_size: usize,
    uses_token_type_ids: bool,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(ModelError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        info!(model = %config.model_id, path = %model_dir.display(), "loading embedding model");

        let session = Session::builder()
            .map_err(|e| ModelError::LoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::LoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e| ModelError::LoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e| ModelError::LoadError(e.to_string()))?;

        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_id: config.model_id.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
            uses_token_type_ids,
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ModelError::TokenizerError(e.to_string()))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let rows = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids());
            for (j, ((&id, &mask), &type_id)) in rows.enumerate() {
                input_ids[i * max_len + j] = i64::from(id);
                attention_mask[i * max_len + j] = i64::from(mask);
                token_type_ids[i * max_len + j] = i64::from(type_id);
            }
        }

        let shape = [batch_size, max_len];
        let ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| ModelError::InferenceError(e.to_string()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| ModelError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = (if self.uses_token_type_ids {
            let type_tensor = Tensor::from_array((shape, token_type_ids))
                .map_err(|e| ModelError::InferenceError(e.to_string()))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
        })
        .map_err(|e| ModelError::InferenceError(e.to_string()))?;

        let (out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceError(e.to_string()))?;

        match out_shape.len() {
            // [batch, seq, hidden]: token embeddings, mean-pool over the mask
            3 => {
                let seq = out_shape[1] as usize;
                let hidden = out_shape[2] as usize;
                if hidden < self.dimension {
                    return Err(ModelError::InferenceError(format!(
                        "model hidden size {hidden} is smaller than configured dimension {}",
                        self.dimension
                    )));
                }
                Ok((0..batch_size)
                    .map(|i| {
                        let mut pooled = vec![0f32; self.dimension];
                        let mut count = 0f32;
                        for j in 0..seq.min(max_len) {
                            if attention_mask[i * max_len + j] == 0 {
                                continue;
                            }
                            count += 1.0;
                            let row = &data[(i * seq + j) * hidden..];
                            for (d, value) in pooled.iter_mut().enumerate() {
                                *value += row[d];
                            }
                        }
                        if count > 0.0 {
                            pooled.iter_mut().for_each(|v| *v /= count);
                        }
                        normalize(&pooled)
                    })
                    .collect())
            }
            // [batch, hidden]: already pooled sentence embeddings
            2 => {
                let hidden = out_shape[1] as usize;
                if hidden < self.dimension {
                    return Err(ModelError::InferenceError(format!(
                        "model hidden size {hidden} is smaller than configured dimension {}",
                        self.dimension
                    )));
                }
                Ok((0..batch_size)
                    .map(|i| normalize(&data[i * hidden..i * hidden + self.dimension]))
                    .collect())
            }
            _ => Err(ModelError::InferenceError(format!(
                "unexpected output shape: {:?}",
                &out_shape[..]
            ))),
        }
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(batch = batch.len(), "running embedding model");
            all.extend(self.embed_batch(batch)?);
        }
        check_embeddings(&all, texts.len(), self.dimension)?;
        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
