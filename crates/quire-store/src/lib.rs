//! Typed multi-vector document store.
//!
//! This crate turns heterogeneous raw records into validated, typed records,
//! embeds one or more of their fields into named vector slots, and stores
//! them in a vector index service for similarity, hybrid keyword+vector and
//! filter retrieval.
//!
//! # Modules
//!
//! - [`schema`]: Record kinds, coercion, validated records
//! - [`embedding`]: `EmbeddingProvider` trait and backends
//! - [`binding`]: Field → vector slot bindings, call-scoped embedding cache
//! - [`index`]: `VectorIndex` trait, Qdrant and in-memory implementations
//! - [`tokenize`]: Query keyword extraction for hybrid search
//! - [`collection`]: Collection declarations and remote lifecycle
//! - [`store`]: Ingest, conditional update, sync, search, delete
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quire_core::QuireConfig;
//! use quire_store::{
//!     CollectionConfig, Distance, EmbeddingBinding, QuestionKind, create_provider,
//! };
//!
//! # async fn example() -> quire_core::Result<()> {
//! let config = QuireConfig::load(None)?;
//! let store = quire_store::connect(&config)?;
//! let provider = create_provider(&config.embedding)?;
//!
//! let binding = EmbeddingBinding::new(
//!     "q-embed",
//!     "question",
//!     config.embedding.dimension,
//!     provider,
//!     Distance::Cosine,
//!     &QuestionKind,
//! )?;
//! let docs = CollectionConfig::new("Docs", Arc::new(QuestionKind), vec![binding])?;
//! store.collections().create(docs).await?;
//!
//! let hits = store.search("Docs", "how do I enrol?", "question", None).await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod collection;
pub mod embedding;
pub mod index;
pub mod schema;
pub mod store;
pub mod tokenize;

use std::sync::Arc;

use quire_core::{QuireConfig, Result};

// Re-export key types at crate root for convenience
pub use binding::{EmbeddingBinding, EmbeddingCache};
pub use collection::{CollectionConfig, CollectionManager, CollectionStatus, EnsureOutcome};
pub use embedding::{
    EmbeddingProvider, MockEmbeddingProvider, OllamaProvider, OpenAiProvider, create_provider,
};
#[cfg(feature = "embed-fastembed")]
pub use embedding::FastEmbedProvider;
pub use index::{
    Distance, FieldMatch, Filter, MemoryIndex, PayloadSchema, PointId, QdrantIndex, ScoredPoint,
    StoredPoint, VectorIndex,
};
pub use schema::{
    CourseKind, CourseScheduleKind, DocumentKind, FieldValue, ForumQuestionKind, NomenclatureKind,
    QuestionKind, RawRecord, Record, RecordKind, SourceType, WikiPageKind, kind_by_name,
};
pub use store::{
    DocumentStore, IngestReport, Rejected, StoreOptions, SyncOutcome, SyncReport, UpdateReport,
};
pub use tokenize::{KeywordTokenizer, Tokenizer};

/// Build a document store over the Qdrant server named in the configuration.
///
/// No network call is made; collections still have to be declared.
pub fn connect(config: &QuireConfig) -> Result<DocumentStore> {
    config.validate()?;

    let index = QdrantIndex::new(&config.index.url, config.index.api_key.clone());
    log::info!("Using vector index at {}", config.index.url);

    let collections = Arc::new(CollectionManager::new(Arc::new(index)));
    let tokenizer = KeywordTokenizer::new(config.store.max_keywords);

    Ok(DocumentStore::new(collections)
        .with_tokenizer(Arc::new(tokenizer))
        .with_options(StoreOptions::from(&config.store)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_applies_store_config() {
        let mut config = QuireConfig::default();
        config.store.batch_size = 25;
        config.store.default_limit = 7;

        let store = connect(&config).unwrap();
        assert_eq!(store.options().batch_size, 25);
        assert_eq!(store.options().default_limit, 7);
        assert_eq!(store.collections().index().name(), "qdrant");
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let mut config = QuireConfig::default();
        config.index.url = String::new();
        assert!(connect(&config).is_err());
    }
}
