//! In-process vector index.
//!
//! Brute-force reference implementation of [`VectorIndex`]. Every query scans
//! all points of the collection, which is fine for tests and small offline
//! corpora. Semantics follow the remote service: upsert overwrites by id,
//! queries with prefetch re-rank the union of prefetch candidates, and ordered
//! scrolls skip points without the ordering key.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use quire_core::{Error, Result};
use tokio::sync::RwLock;

use super::{
    Direction, Distance, PayloadSchema, Point, PointId, PointSelector, ScoredPoint, ScrollRequest,
    StoredPoint, VectorIndex, VectorParams, VectorQuery,
};

#[derive(Debug, Default)]
struct MemoryCollection {
    vectors: BTreeMap<String, VectorParams>,
    payload_indexes: BTreeMap<String, PayloadSchema>,
    points: Vec<Point>,
}

impl MemoryCollection {
    fn score(&self, point: &Point, using: &str, query: &[f32]) -> Option<f32> {
        let distance = self.vectors.get(using)?.distance;
        let vector = point.vectors.get(using)?;
        Some(similarity(distance, query, vector))
    }

    fn top(&self, candidates: &[&Point], using: &str, query: &[f32], limit: usize) -> Vec<ScoredPoint> {
        let mut scored: Vec<ScoredPoint> = candidates
            .iter()
            .filter_map(|p| {
                self.score(p, using, query).map(|score| ScoredPoint {
                    id: p.id,
                    score,
                    payload: p.payload.clone(),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(CmpOrdering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Vector index held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
    upsert_calls: AtomicUsize,
    fail_upsert_after: Option<usize>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert after the first `n` fail with a remote error.
    pub fn fail_upsert_after(mut self, n: usize) -> Self {
        self.fail_upsert_after = Some(n);
        self
    }

    /// Number of upsert calls received, including failed ones.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of points stored in a collection, `None` if it does not exist.
    pub async fn point_count(&self, name: &str) -> Option<usize> {
        self.collections.read().await.get(name).map(|c| c.points.len())
    }

    /// Copy of a stored point.
    pub async fn get_point(&self, name: &str, id: PointId) -> Option<Point> {
        self.collections
            .read()
            .await
            .get(name)?
            .points
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Payload indexes declared on a collection.
    pub async fn payload_indexes(&self, name: &str) -> Option<BTreeMap<String, PayloadSchema>> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.payload_indexes.clone())
    }
}

fn missing(name: &str) -> Error {
    Error::remote(format!("Collection '{name}' not found"))
}

fn similarity(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    let pairs = a.iter().zip(b);
    match distance {
        Distance::Dot => pairs.map(|(x, y)| x * y).sum(),
        Distance::Cosine => {
            let dot: f32 = pairs.map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        Distance::Euclid => -pairs.map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        Distance::Manhattan => -pairs.map(|(x, y)| (x - y).abs()).sum::<f32>(),
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        vectors: &BTreeMap<String, VectorParams>,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(Error::remote(format!("Collection '{name}' already exists")));
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                vectors: vectors.clone(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn create_payload_index(
        &self,
        name: &str,
        field: &str,
        schema: PayloadSchema,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection.payload_indexes.insert(field.to_string(), schema);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| missing(name))
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert_after.is_some_and(|n| call >= n) {
            return Err(Error::remote(format!("Injected upsert failure on call {}", call + 1)));
        }

        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        for point in &points {
            for (slot, params) in &collection.vectors {
                match point.vectors.get(slot) {
                    Some(v) if v.len() == params.size => {}
                    Some(v) => {
                        return Err(Error::remote(format!(
                            "Wrong vector dimension for '{slot}': expected {}, got {}",
                            params.size,
                            v.len()
                        )));
                    }
                    None => {
                        return Err(Error::remote(format!("Point {} lacks vector '{slot}'", point.id)));
                    }
                }
            }
        }

        for point in points {
            match collection.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => collection.points.push(point),
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str, selector: PointSelector) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        match selector {
            PointSelector::Ids(ids) => {
                let ids: HashSet<PointId> = ids.into_iter().collect();
                collection.points.retain(|p| !ids.contains(&p.id));
            }
            PointSelector::Filter(filter) => {
                collection.points.retain(|p| !filter.matches(&p.payload));
            }
        }
        Ok(())
    }

    async fn query(&self, name: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        if !collection.vectors.contains_key(&query.using) {
            return Err(Error::remote(format!("Unknown vector name '{}'", query.using)));
        }

        let candidates: Vec<&Point> = if query.prefetch.is_empty() {
            collection.points.iter().collect()
        } else {
            let mut seen = HashSet::new();
            let mut union = Vec::new();
            for stage in &query.prefetch {
                let all: Vec<&Point> = collection.points.iter().collect();
                for hit in collection.top(&all, &stage.using, &stage.vector, stage.limit) {
                    if seen.insert(hit.id) {
                        if let Some(p) = collection.points.iter().find(|p| p.id == hit.id) {
                            union.push(p);
                        }
                    }
                }
            }
            union
        };

        let filtered: Vec<&Point> = match &query.filter {
            Some(filter) => candidates
                .into_iter()
                .filter(|p| filter.matches(&p.payload))
                .collect(),
            None => candidates,
        };

        Ok(collection.top(&filtered, &query.using, &query.vector, query.limit))
    }

    async fn scroll(&self, name: &str, request: ScrollRequest) -> Result<Vec<StoredPoint>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        let mut selected: Vec<&Point> = collection
            .points
            .iter()
            .filter(|p| request.filter.as_ref().is_none_or(|f| f.matches(&p.payload)))
            .collect();

        if let Some(order) = &request.order_by {
            let key = |p: &Point| p.payload.get(&order.key).and_then(|v| v.as_f64());
            selected.retain(|p| key(*p).is_some());
            selected.sort_by(|a, b| {
                let ord = key(*a)
                    .partial_cmp(&key(*b))
                    .unwrap_or(CmpOrdering::Equal);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        Ok(selected
            .into_iter()
            .take(request.limit)
            .map(|p| StoredPoint {
                id: p.id,
                payload: p.payload.clone(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
