//! Embedding provider trait, mock implementation, and provider factory.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! the embedding backends a binding can delegate to. Callers never branch on
//! the concrete backend.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic fixed-dimension vectors for testing
//! - `OpenAiProvider`: Remote embeddings API
//! - `OllamaProvider`: Local Ollama model server
//! - `FastEmbedProvider`: In-process ONNX models (requires `embed-fastembed` feature)

mod ollama;
mod openai;

#[cfg(feature = "embed-fastembed")]
mod fastembed;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use quire_core::{EmbeddingConfig, Error, Result};

#[cfg(feature = "embed-fastembed")]
pub use self::fastembed::FastEmbedProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Trait for generating text embeddings.
///
/// Implementations wrap a specific backend and provide a uniform async
/// interface. The trait requires `Send + Sync` so a single provider can be
/// shared by several bindings through an `Arc`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Generates deterministic vectors from the input bytes and counts how many
/// texts it has embedded, so tests can assert on provider traffic.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generate a deterministic embedding from text.
    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        let bytes = text.as_bytes();
        if bytes.is_empty() {
            return embedding;
        }

        // Fold every byte into the vector so texts sharing a prefix differ
        for (pos, byte) in bytes.iter().enumerate() {
            let slot = pos % self.dimension.max(1);
            if let Some(val) = embedding.get_mut(slot) {
                *val += f32::from(*byte) * (pos as f32 + 1.0);
            }
        }
        for (i, val) in embedding.iter_mut().enumerate() {
            *val = ((*val + i as f32 * 31.0) % 251.0 + 1.0) / 252.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.deterministic_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the provider selected by the configuration.
///
/// Supported providers: `openai`, `ollama`, `fastembed` (with the
/// `embed-fastembed` feature) and `mock`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    log::debug!(
        "Creating embedding provider '{}' (model {}, dimension {})",
        config.provider,
        config.model,
        config.dimension
    );

    match config.provider.as_str() {
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    Error::config("embedding.api_key (or OPENAI_API_KEY) is required for openai")
                })?;
            let mut provider = OpenAiProvider::new(api_key, &config.model, config.dimension);
            if let Some(url) = &config.url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        "ollama" => {
            let mut provider = OllamaProvider::new(&config.model, config.dimension);
            if let Some(url) = &config.url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        "fastembed" => create_fastembed(config),
        "mock" => Ok(Arc::new(MockEmbeddingProvider::new(config.dimension))),
        other => Err(Error::config(format!(
            "Unknown embedding provider: '{other}'. Supported: openai, ollama, fastembed, mock"
        ))),
    }
}

#[cfg(feature = "embed-fastembed")]
fn create_fastembed(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = FastEmbedProvider::new(&config.model, config.cache_path.as_deref())?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "embed-fastembed"))]
fn create_fastembed(_config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(Error::config(
        "fastembed provider requires the 'embed-fastembed' feature",
    ))
}

// ============================================================================
// Tests
// ============================================================================
