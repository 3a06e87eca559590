//! Ollama model server provider.

use async_trait::async_trait;
use quire_core::{Error, Result};
use serde_json::{Value, json};

use super::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Embedding provider backed by a local Ollama server (`/api/embed`).
pub struct OllamaProvider {
    model: String,
    base_url: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a provider for `model` on the default local server.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            dimension,
            client: reqwest::Client::new(),
        }
    }

    /// Use a server other than `localhost:11434`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, input: Value) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Failed to call Ollama: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::embedding(format!(
                "Ollama error {status}: {error_text}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse Ollama response: {e}")))?;

        let vectors: Vec<Vec<f32>> = serde_json::from_value(body["embeddings"].clone())
            .map_err(|e| Error::embedding(format!("Malformed Ollama embeddings: {e}")))?;
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.call(json!(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.call(json!(texts)).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}
