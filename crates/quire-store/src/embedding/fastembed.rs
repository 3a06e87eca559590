//! FastEmbed embedding provider.
//!
//! Wraps the `fastembed` crate to encode text in-process with pre-trained
//! ONNX models (e.g., multilingual E5, BGE-small).
//!
//! # Thread Safety
//!
//! `fastembed::TextEmbedding` needs exclusive access while encoding, so it is
//! wrapped in `Arc<Mutex<>>` and every call runs on `spawn_blocking`.
//!
//! # Feature Gate
//!
//! This module requires the `embed-fastembed` feature.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quire_core::{Error, Result};

use super::EmbeddingProvider;

/// Map a model name string to a fastembed `EmbeddingModel` enum variant.
fn resolve_model(name: &str) -> Result<::fastembed::EmbeddingModel> {
    use ::fastembed::EmbeddingModel;

    match name {
        "multilingual-e5-small" | "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" | "MultilingualE5Base" => Ok(EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" | "MultilingualE5Large" => Ok(EmbeddingModel::MultilingualE5Large),
        "bge-small-en-v1.5" | "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "all-minilm-l6-v2" | "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => Err(Error::config(format!(
            "Unknown embedding model: '{other}'. Supported: multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, bge-small-en-v1.5, all-minilm-l6-v2"
        ))),
    }
}

/// In-process embedding provider.
///
/// The model is loaded once and reused for all subsequent calls. Batches are
/// encoded in a single model invocation.
pub struct FastEmbedProvider {
    model: Arc<Mutex<::fastembed::TextEmbedding>>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedProvider {
    /// Load `model_name`, downloading it into `cache_path` if needed.
    pub fn new(model_name: &str, cache_path: Option<&str>) -> Result<Self> {
        let model_enum = resolve_model(model_name)?;

        let mut init = ::fastembed::InitOptions::new(model_enum);
        if let Some(path) = cache_path {
            init = init.with_cache_dir(std::path::PathBuf::from(path));
        }

        #[allow(unused_mut)]
        let mut text_embedding = ::fastembed::TextEmbedding::try_new(init)
            .map_err(|e| Error::embedding(format!("Failed to initialize fastembed model: {e}")))?;

        // Probe dimension via a test embedding
        let probe = text_embedding
            .embed(vec!["dimension probe"], None)
            .map_err(|e| Error::embedding(format!("Failed to probe embedding dimension: {e}")))?;

        let dimension = probe
            .first()
            .map(|v| v.len())
            .ok_or_else(|| Error::embedding("Empty probe embedding"))?;

        log::info!("Loaded fastembed model {model_name} ({dimension} dimensions)");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            dimension,
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            #[allow(unused_mut)]
            let mut model = model
                .lock()
                .map_err(|e| Error::embedding(format!("Mutex poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::embedding(format!("Batch embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::embedding(format!("spawn_blocking failed: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}
