//! Qdrant HTTP API adapter.
//!
//! Talks to the REST interface of a Qdrant server. Request bodies are built
//! by small pure functions so their shape can be tested without a server.
//! Every response is wrapped as `{"result": ..., "status": ..., "time": ...}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use quire_core::{Error, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{
    PayloadSchema, Point, PointSelector, ScoredPoint, ScrollRequest, StoredPoint, VectorIndex,
    VectorParams, VectorQuery,
};

/// Vector index backed by a Qdrant server.
pub struct QdrantIndex {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantIndex {
    /// Creates an adapter for the server at `url` (e.g. `http://localhost:6333`).
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        log::debug!("{method} {url}");

        let mut builder = self.client.request(method.clone(), &url);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::remote_with_source(format!("Failed to call {method} {path}"), e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::remote(format!(
                "Qdrant error {status} on {method} {path}: {error_text}"
            )));
        }

        let mut envelope: Value = response
            .json()
            .await
            .map_err(|e| Error::remote_with_source(format!("Failed to parse response of {path}"), e))?;
        let result = envelope
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null);

        serde_json::from_value(result)
            .map_err(|e| Error::remote_with_source(format!("Unexpected result shape from {path}"), e))
    }
}

// ============================================================================
// Request bodies
// ============================================================================

fn create_collection_body(vectors: &BTreeMap<String, VectorParams>) -> Value {
    json!({ "vectors": vectors })
}

fn payload_index_body(field: &str, schema: PayloadSchema) -> Value {
    json!({
        "field_name": field,
        "field_schema": schema,
    })
}

fn upsert_body(points: &[Point]) -> Value {
    let points: Vec<Value> = points
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "vector": p.vectors,
                "payload": p.payload,
            })
        })
        .collect();
    json!({ "points": points })
}

fn delete_body(selector: &PointSelector) -> Value {
    match selector {
        PointSelector::Ids(ids) => json!({ "points": ids }),
        PointSelector::Filter(filter) => json!({ "filter": filter }),
    }
}

fn query_body(query: &VectorQuery) -> Value {
    let mut body = json!({
        "query": query.vector,
        "using": query.using,
        "limit": query.limit,
        "with_payload": true,
    });
    if let Some(filter) = &query.filter {
        body["filter"] = json!(filter);
    }
    if !query.prefetch.is_empty() {
        body["prefetch"] = query
            .prefetch
            .iter()
            .map(|p| {
                json!({
                    "query": p.vector,
                    "using": p.using,
                    "limit": p.limit,
                })
            })
            .collect();
    }
    body
}

fn scroll_body(request: &ScrollRequest) -> Value {
    let mut body = json!({
        "limit": request.limit,
        "with_payload": true,
        "with_vector": false,
    });
    if let Some(filter) = &request.filter {
        body["filter"] = json!(filter);
    }
    if let Some(order) = &request.order_by {
        body["order_by"] = json!(order);
    }
    body
}

#[derive(serde::Deserialize)]
struct CollectionList {
    collections: Vec<CollectionDescription>,
}

#[derive(serde::Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(serde::Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(serde::Deserialize)]
struct ScrollResult {
    points: Vec<StoredPoint>,
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let list: CollectionList = self.request(Method::GET, "/collections", None).await?;
        Ok(list.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        vectors: &BTreeMap<String, VectorParams>,
    ) -> Result<()> {
        let _: Value = self
            .request(
                Method::PUT,
                &format!("/collections/{name}"),
                Some(create_collection_body(vectors)),
            )
            .await?;
        Ok(())
    }

    async fn create_payload_index(
        &self,
        name: &str,
        field: &str,
        schema: PayloadSchema,
    ) -> Result<()> {
        let _: Value = self
            .request(
                Method::PUT,
                &format!("/collections/{name}/index?wait=true"),
                Some(payload_index_body(field, schema)),
            )
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let _: Value = self
            .request(Method::DELETE, &format!("/collections/{name}"), None)
            .await?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        let _: Value = self
            .request(
                Method::PUT,
                &format!("/collections/{name}/points?wait=true"),
                Some(upsert_body(&points)),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str, selector: PointSelector) -> Result<()> {
        let _: Value = self
            .request(
                Method::POST,
                &format!("/collections/{name}/points/delete?wait=true"),
                Some(delete_body(&selector)),
            )
            .await?;
        Ok(())
    }

    async fn query(&self, name: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>> {
        let result: QueryResult = self
            .request(
                Method::POST,
                &format!("/collections/{name}/points/query"),
                Some(query_body(&query)),
            )
            .await?;
        Ok(result.points)
    }

    async fn scroll(&self, name: &str, request: ScrollRequest) -> Result<Vec<StoredPoint>> {
        let result: ScrollResult = self
            .request(
                Method::POST,
                &format!("/collections/{name}/points/scroll"),
                Some(scroll_body(&request)),
            )
            .await?;
        Ok(result.points)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
