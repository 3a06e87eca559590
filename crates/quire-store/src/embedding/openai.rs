//! OpenAI embeddings API provider.

use async_trait::async_trait;
use quire_core::{Error, Result};
use serde_json::{Value, json};

use super::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider using the OpenAI `/embeddings` endpoint.
///
/// Any server exposing the same API shape can be targeted with
/// [`OpenAiProvider::with_base_url`].
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - API key sent as a bearer token
    /// * `model` - Model ID (e.g., "text-embedding-3-small")
    /// * `dimension` - Length of the vectors the model returns
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            dimension,
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different API root.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, input: Value) -> Value {
        json!({
            "input": input,
            "model": self.model,
        })
    }

    async fn call(&self, input: Value) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(input))
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Failed to call embeddings API: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::embedding(format!(
                "Embeddings API error {status}: {error_text}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embeddings response: {e}")))?;

        parse_response(&body)
    }
}

/// Extract `data[*].embedding` in input order.
fn parse_response(body: &Value) -> Result<Vec<Vec<f32>>> {
    let data = body["data"]
        .as_array()
        .ok_or_else(|| Error::embedding("Missing data in embeddings response"))?;

    let mut items: Vec<(u64, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().unwrap_or(pos as u64);
        let vector = item["embedding"]
            .as_array()
            .ok_or_else(|| Error::embedding("Missing embedding in response item"))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| Error::embedding("Non-numeric embedding component"))
            })
            .collect::<Result<Vec<f32>>>()?;
        items.push((index, vector));
    }
    items.sort_by_key(|(index, _)| *index);

    Ok(items.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
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
        let vectors = self.call(json!(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "openai"
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("dimension", &self.dimension)
            .finish()
    }
}
