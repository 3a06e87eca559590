//! Embedding field bindings.
//!
//! An [`EmbeddingBinding`] ties one field of a record kind to a named vector
//! slot and the provider that fills it. Field membership, slot size and
//! provider dimension are checked once, at construction, so a binding that
//! exists can always embed records of its kind.
//!
//! Text is normalized before embedding: rendered, lower-cased and trimmed.
//! Null or empty text yields a zero vector without a provider call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use quire_core::{Error, Result};

use crate::embedding::EmbeddingProvider;
use crate::index::{Distance, VectorParams};
use crate::schema::{Record, RecordKind};

/// Maps a record field to a named vector slot.
#[derive(Clone)]
pub struct EmbeddingBinding {
    slot: String,
    source_field: String,
    size: usize,
    distance: Distance,
    kind: &'static str,
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingBinding {
    /// Create a binding for records of `kind`.
    ///
    /// Fails with `InvalidBinding` when `source_field` is not declared by the
    /// kind, when `size` is zero, or when the provider produces vectors of a
    /// different length.
    pub fn new(
        slot: impl Into<String>,
        source_field: impl Into<String>,
        size: usize,
        provider: Arc<dyn EmbeddingProvider>,
        distance: Distance,
        kind: &dyn RecordKind,
    ) -> Result<Self> {
        let slot = slot.into();
        let source_field = source_field.into();

        if slot.trim().is_empty() {
            return Err(Error::binding("slot name must not be empty"));
        }
        if !kind.has_field(&source_field) {
            return Err(Error::binding(format!(
                "field '{source_field}' is not declared by record kind '{}'",
                kind.name()
            )));
        }
        if size == 0 {
            return Err(Error::binding(format!("slot '{slot}' must have a non-zero size")));
        }
        if provider.dimension() != size {
            return Err(Error::binding(format!(
                "slot '{slot}' has size {size} but provider '{}' produces {} dimensions",
                provider.name(),
                provider.dimension()
            )));
        }

        Ok(Self {
            slot,
            source_field,
            size,
            distance,
            kind: kind.name(),
            provider,
        })
    }

    /// Vector slot name.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Record field that is embedded.
    pub fn source_field(&self) -> &str {
        &self.source_field
    }

    /// Vector length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Similarity metric of the slot.
    pub fn distance(&self) -> Distance {
        self.distance
    }

    /// Name of the record kind the binding was built for.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The provider filling this slot.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// True when both bindings delegate to the same provider instance.
    pub fn shares_provider(&self, other: &EmbeddingBinding) -> bool {
        Arc::ptr_eq(&self.provider, &other.provider)
    }

    /// Shape of the vector space this binding writes to.
    pub fn vector_params(&self) -> VectorParams {
        VectorParams {
            size: self.size,
            distance: self.distance,
        }
    }

    /// Normalized text of the bound field, `None` when there is nothing to embed.
    pub fn text_of(&self, record: &Record) -> Result<Option<String>> {
        let value = record.get(&self.source_field)?;
        Ok(value.as_text().and_then(|t| normalize(&t)))
    }

    /// Embed the bound field of a record.
    pub async fn embed(&self, record: &Record) -> Result<Vec<f32>> {
        match self.text_of(record)? {
            Some(text) => self.call_provider(&text).await,
            None => Ok(self.zero_vector()),
        }
    }

    /// Embed a query string with the same normalization as stored records.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match normalize(text) {
            Some(text) => self.call_provider(&text).await,
            None => Ok(self.zero_vector()),
        }
    }

    /// Embed the bound field of a record, reusing vectors already in `cache`.
    pub async fn embed_cached(&self, record: &Record, cache: &mut EmbeddingCache) -> Result<Vec<f32>> {
        let Some(text) = self.text_of(record)? else {
            return Ok(self.zero_vector());
        };
        if let Some(vector) = cache.get(&self.slot, &text) {
            return Ok(vector);
        }
        let vector = self.call_provider(&text).await?;
        cache.insert(&self.slot, text, vector.clone());
        Ok(vector)
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.size]
    }

    async fn call_provider(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await?;
        if vector.len() != self.size {
            return Err(Error::embedding(format!(
                "provider '{}' returned {} dimensions for slot '{}', expected {}",
                self.provider.name(),
                vector.len(),
                self.slot,
                self.size
            )));
        }
        Ok(vector)
    }
}

impl fmt::Debug for EmbeddingBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingBinding")
            .field("slot", &self.slot)
            .field("source_field", &self.source_field)
            .field("size", &self.size)
            .field("distance", &self.distance)
            .field("kind", &self.kind)
            .field("provider", &self.provider.name())
            .finish()
    }
}

fn normalize(text: &str) -> Option<String> {
    let text = text.trim().to_lowercase();
    (!text.is_empty()).then_some(text)
}

/// Call-scoped memo of vectors keyed by (slot, normalized text).
///
/// Created by a batch operation, dropped when it returns; never shared
/// between calls.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    vectors: HashMap<(String, String), Vec<f32>>,
    hits: usize,
}

impl EmbeddingCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&mut self, slot: &str, text: &str) -> Option<Vec<f32>> {
        let found = self
            .vectors
            .get(&(slot.to_string(), text.to_string()))
            .cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    fn insert(&mut self, slot: &str, text: String, vector: Vec<f32>) {
        self.vectors.insert((slot.to_string(), text), vector);
    }

    /// Number of distinct (slot, text) entries.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True when nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::schema::{CourseKind, QuestionKind, RawRecord};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    fn record(value: Value) -> Record {
        let raw: RawRecord = match value {
            Value::Object(map) => map,
            _ => unreachable!("fixtures are objects"),
        };
        QuestionKind.construct(&raw).unwrap()
    }

    fn question(q: &str) -> Record {
        record(json!({"question": q, "answer": "b", "type_source": "сайт", "source": "s"}))
    }

    fn binding(provider: Arc<MockEmbeddingProvider>) -> EmbeddingBinding {
        EmbeddingBinding::new("q-embed", "question", 3, provider, Distance::Cosine, &QuestionKind)
            .unwrap()
    }

    #[test]
    fn test_binding_rejects_unknown_field() {
        let provider = Arc::new(MockEmbeddingProvider::new(3));
        let err = EmbeddingBinding::new("t", "title", 3, provider, Distance::Cosine, &QuestionKind)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBinding(ref m) if m.contains("title")));
    }

    #[test]
    fn test_binding_rejects_zero_size() {
        let provider = Arc::new(MockEmbeddingProvider::new(0));
        let err = EmbeddingBinding::new("q", "question", 0, provider, Distance::Cosine, &QuestionKind)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBinding(_)));
    }

    #[test]
    fn test_binding_rejects_dimension_mismatch() {
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        let err = EmbeddingBinding::new("q", "question", 3, provider, Distance::Cosine, &QuestionKind)
            .unwrap_err();
        assert!(err.to_string().contains("8 dimensions"));
    }

    #[tokio::test]
    async fn test_embed_normalizes_text() {
        let provider = Arc::new(MockEmbeddingProvider::new(3));
        let b = binding(provider.clone());
        let upper = b.embed(&question("  Hello ")).await.unwrap();
        let lower = provider.embed("hello").await.unwrap();
        assert_eq!(upper, lower);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector_without_call() {
        let provider = Arc::new(MockEmbeddingProvider::new(3));
        let b = binding(provider.clone());
        assert_eq!(b.embed(&question("   ")).await.unwrap(), vec![0.0; 3]);
        assert_eq!(b.embed_query("").await.unwrap(), vec![0.0; 3]);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_null_list_field_is_zero_vector() {
        let provider = Arc::new(MockEmbeddingProvider::new(3));
        let b = EmbeddingBinding::new(
            "teachers",
            "course_teacher",
            3,
            provider.clone(),
            Distance::Cosine,
            &CourseKind,
        )
        .unwrap();
        let raw: RawRecord = match json!({"type_source": "каскад", "source": "s", "course_name": "c"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let course = CourseKind.construct(&raw).unwrap();
        assert_eq!(b.embed(&course).await.unwrap(), vec![0.0; 3]);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_embeds_each_text_once() {
        let provider = Arc::new(MockEmbeddingProvider::new(3));
        let b = binding(provider.clone());
        let mut cache = EmbeddingCache::new();
        for q in ["a", "A", " a", "b", "a"] {
            b.embed_cached(&question(q), &mut cache).await.unwrap();
        }
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 3);
    }

    struct WrongLength;

    #[async_trait]
    impl EmbeddingProvider for WrongLength {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 2])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "wrong-length"
        }
    }

    #[tokio::test]
    async fn test_wrong_length_from_provider() {
        let b = EmbeddingBinding::new(
            "q",
            "question",
            3,
            Arc::new(WrongLength),
            Distance::Cosine,
            &QuestionKind,
        )
        .unwrap();
        let err = b.embed(&question("x")).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn test_shares_provider() {
        let shared = Arc::new(MockEmbeddingProvider::new(3));
        let a = binding(shared.clone());
        let b = EmbeddingBinding::new("a-embed", "answer", 3, shared, Distance::Cosine, &QuestionKind)
            .unwrap();
        let c = binding(Arc::new(MockEmbeddingProvider::new(3)));
        assert!(a.shares_provider(&b));
        assert!(!a.shares_provider(&c));
    }
}
