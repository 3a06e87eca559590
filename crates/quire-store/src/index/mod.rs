//! Vector index service contract.
//!
//! [`VectorIndex`] is the narrow set of remote operations the store relies
//! on: collection lifecycle, upsert, delete, vector query with prefetch, and
//! filtered scroll. Two implementations ship with the crate:
//!
//! - [`QdrantIndex`]: the Qdrant HTTP API
//! - [`MemoryIndex`]: brute-force in-process index for tests and offline runs

mod filter;
mod memory;
mod qdrant;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use quire_core::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::Payload;

pub use filter::{Condition, FieldMatch, Filter, Match};
pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

// ============================================================================
// Collection structure
// ============================================================================

/// Similarity metric of a vector space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distance {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Dot product.
    Dot,
    /// Euclidean distance.
    Euclid,
    /// Manhattan distance.
    Manhattan,
}

/// Shape of one named vector space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorParams {
    /// Vector length.
    pub size: usize,
    /// Similarity metric.
    pub distance: Distance,
}

/// Type of a secondary payload index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchema {
    /// Exact-match strings (and string arrays).
    Keyword,
    /// Integers.
    Integer,
    /// Floats, e.g. UNIX timestamps used for ordering.
    Float,
    /// Booleans.
    Bool,
    /// RFC 3339 datetimes.
    Datetime,
    /// Full-text.
    Text,
}

// ============================================================================
// Points
// ============================================================================

/// Identifier of a stored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    /// Unsigned integer id.
    Num(u64),
    /// UUID id.
    Uuid(Uuid),
}

impl From<Uuid> for PointId {
    fn from(id: Uuid) -> Self {
        PointId::Uuid(id)
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        PointId::Num(id)
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{n}"),
            PointId::Uuid(u) => write!(f, "{u}"),
        }
    }
}

/// Slot name → vector.
pub type NamedVectors = BTreeMap<String, Vec<f32>>;

/// A point to write.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Point id; an existing id is overwritten.
    pub id: PointId,
    /// One vector per declared slot.
    pub vectors: NamedVectors,
    /// Flattened record.
    pub payload: Payload,
}

/// A point returned by a vector query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPoint {
    /// Point id.
    pub id: PointId,
    /// Similarity score, higher is closer.
    pub score: f32,
    /// Stored payload.
    #[serde(default)]
    pub payload: Payload,
}

/// A point returned by a scroll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredPoint {
    /// Point id.
    pub id: PointId,
    /// Stored payload.
    #[serde(default)]
    pub payload: Payload,
}

/// Which points a delete removes.
#[derive(Debug, Clone, PartialEq)]
pub enum PointSelector {
    /// Explicit ids.
    Ids(Vec<PointId>),
    /// Every point matching the filter.
    Filter(Filter),
}

// ============================================================================
// Requests
// ============================================================================

/// A candidate-gathering stage of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Prefetch {
    /// Query vector.
    pub vector: Vec<f32>,
    /// Slot to search.
    pub using: String,
    /// Number of candidates to gather.
    pub limit: usize,
}

/// A nearest-neighbour query.
///
/// With prefetches, the candidates gathered by every prefetch are filtered
/// and re-ranked by `vector` against `using`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    /// Query vector.
    pub vector: Vec<f32>,
    /// Slot to rank by.
    pub using: String,
    /// Number of results.
    pub limit: usize,
    /// Payload filter applied to the results.
    pub filter: Option<Filter>,
    /// Candidate stages.
    pub prefetch: Vec<Prefetch>,
}

impl VectorQuery {
    /// Plain top-`limit` query against one slot.
    pub fn new(using: impl Into<String>, vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            using: using.into(),
            limit,
            filter: None,
            prefetch: Vec::new(),
        }
    }
}

/// Sort direction for ordered scrolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// Ordering of a scroll by a numeric payload key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Payload key.
    pub key: String,
    /// Sort direction.
    pub direction: Direction,
}

/// A filter-only read.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollRequest {
    /// Payload filter.
    pub filter: Option<Filter>,
    /// Page size.
    pub limit: usize,
    /// Optional ordering; points lacking the key are skipped.
    pub order_by: Option<OrderBy>,
}

impl ScrollRequest {
    /// Unordered page of up to `limit` points.
    pub fn new(filter: Option<Filter>, limit: usize) -> Self {
        Self {
            filter,
            limit,
            order_by: None,
        }
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Operations the document store needs from a vector index service.
///
/// Errors are returned as `Error::Remote` and are never retried by callers.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a collection with one named vector space per entry.
    async fn create_collection(
        &self,
        name: &str,
        vectors: &BTreeMap<String, VectorParams>,
    ) -> Result<()>;

    /// Create a secondary index on a payload key.
    async fn create_payload_index(
        &self,
        name: &str,
        field: &str,
        schema: PayloadSchema,
    ) -> Result<()>;

    /// Delete a collection and all its points.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Insert or overwrite points.
    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()>;

    /// Delete points.
    async fn delete(&self, name: &str, selector: PointSelector) -> Result<()>;

    /// Nearest-neighbour query, best match first.
    async fn query(&self, name: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>>;

    /// Filter-only read.
    async fn scroll(&self, name: &str, request: ScrollRequest) -> Result<Vec<StoredPoint>>;

    /// The backend name for diagnostics.
    fn name(&self) -> &str;
}
