//! Document store: typed ingestion, conditional update, incremental sync,
//! and search over declared collections.
//!
//! Every operation resolves the collection's declared configuration first and
//! fails with `UnconfiguredCollection` before touching the index. Field-name
//! errors are likewise raised before any remote call. Remote failures are
//! propagated unmodified; nothing is retried.

mod ingest;
mod search;

use std::collections::BTreeMap;
use std::sync::Arc;

use quire_core::{Result, StoreConfig};
use serde_json::Value;
use uuid::Uuid;

use crate::binding::EmbeddingCache;
use crate::collection::{CollectionConfig, CollectionManager};
use crate::index::{NamedVectors, Point, PointId, VectorIndex};
use crate::schema::Record;
use crate::tokenize::{KeywordTokenizer, Tokenizer};

pub use ingest::{IngestReport, Rejected, SyncOutcome, SyncReport, UpdateReport};

/// Tuning knobs of a [`DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Points per upsert request.
    pub batch_size: usize,
    /// Page size of filter-only reads.
    pub scroll_limit: usize,
    /// Search limit used when the caller passes none.
    pub default_limit: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            scroll_limit: config.scroll_limit.max(1),
            default_limit: config.default_limit,
        }
    }
}

/// Typed multi-vector document store.
pub struct DocumentStore {
    collections: Arc<CollectionManager>,
    tokenizer: Arc<dyn Tokenizer>,
    options: StoreOptions,
}

impl DocumentStore {
    /// Store over a collection registry, with the default keyword tokenizer
    /// and options.
    pub fn new(collections: Arc<CollectionManager>) -> Self {
        Self {
            collections,
            tokenizer: Arc::new(KeywordTokenizer::default()),
            options: StoreOptions::default(),
        }
    }

    /// Replace the query tokenizer used by hybrid search.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Replace the store options.
    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = StoreOptions {
            batch_size: options.batch_size.max(1),
            scroll_limit: options.scroll_limit.max(1),
            ..options
        };
        self
    }

    /// The collection registry.
    pub fn collections(&self) -> &Arc<CollectionManager> {
        &self.collections
    }

    /// The query tokenizer.
    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Current options.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn index(&self) -> &dyn VectorIndex {
        self.collections.index().as_ref()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("collections", &self.collections)
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Embed every bound field of `record` and assemble the point to write.
async fn build_point(
    config: &CollectionConfig,
    record: &Record,
    cache: &mut EmbeddingCache,
    id: PointId,
) -> Result<Point> {
    let mut vectors = NamedVectors::new();
    for binding in config.bindings() {
        let vector = binding.embed_cached(record, cache).await?;
        vectors.insert(binding.slot().to_string(), vector);
    }
    Ok(Point {
        id,
        vectors,
        payload: record.to_payload(),
    })
}

/// Deterministic id for a natural key within a collection.
///
/// Two writers deriving the id from the same key address the same point.
fn natural_id(collection: &str, key: &[Value]) -> PointId {
    let mut material = Vec::with_capacity(key.len() + 1);
    material.push(Value::String(collection.to_string()));
    material.extend_from_slice(key);
    let bytes = Value::Array(material).to_string();
    PointId::Uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, bytes.as_bytes()))
}

/// Accumulates points and upserts them in fixed-size batches.
struct BatchWriter<'a> {
    index: &'a dyn VectorIndex,
    collection: &'a str,
    batch_size: usize,
    pending: Vec<Point>,
    written: usize,
    batches: usize,
}

impl<'a> BatchWriter<'a> {
    fn new(index: &'a dyn VectorIndex, collection: &'a str, batch_size: usize) -> Self {
        Self {
            index,
            collection,
            batch_size: batch_size.max(1),
            pending: Vec::with_capacity(batch_size.max(1)),
            written: 0,
            batches: 0,
        }
    }

    async fn push(&mut self, point: Point) -> Result<()> {
        self.pending.push(point);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        self.index.upsert(self.collection, batch).await?;
        self.written += count;
        self.batches += 1;
        log::debug!(
            "Flushed batch {} ({count} points) to '{}'",
            self.batches,
            self.collection
        );
        Ok(())
    }

    /// Flush the remainder; returns the number of points written.
    async fn finish(mut self) -> Result<usize> {
        self.flush().await?;
        Ok(self.written)
    }
}

/// Validate that every name is a declared field of the collection's kind.
fn require_fields<'f>(config: &CollectionConfig, fields: impl IntoIterator<Item = &'f str>) -> Result<()> {
    let kind = config.kind();
    for field in fields {
        if !kind.has_field(field) {
            return Err(quire_core::Error::unknown_field(kind.name(), field));
        }
    }
    Ok(())
}

/// Compact field → value map used in log lines.
fn describe_key(fields: &[&str], values: &[Value]) -> String {
    fields
        .iter()
        .zip(values)
        .map(|(f, v)| (f.to_string(), v.clone()))
        .collect::<BTreeMap<String, Value>>()
        .into_iter()
        .map(|(f, v)| format!("{f}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
