//! Read and delete paths.

use std::collections::BTreeMap;

use quire_core::{Error, Result};
use serde_json::Value;

use super::{DocumentStore, require_fields};
use crate::binding::EmbeddingBinding;
use crate::index::{
    Condition, FieldMatch, Filter, PointId, PointSelector, Prefetch, ScoredPoint, ScrollRequest,
    StoredPoint, VectorQuery,
};
use crate::schema::TOKENS_FIELD;

impl DocumentStore {
    /// Top-`limit` points by similarity of `text` to the slot bound to `field`.
    ///
    /// `limit` defaults to the store's `default_limit`.
    pub async fn search(
        &self,
        collection: &str,
        text: &str,
        field: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredPoint>> {
        let config = self.collections.config(collection)?;
        let binding = config
            .binding_for_field(field)
            .ok_or_else(|| Error::unknown_binding_field(collection, field))?;

        let vector = binding.embed_query(text).await?;
        let limit = limit.unwrap_or(self.options.default_limit);
        self.index()
            .query(collection, VectorQuery::new(binding.slot(), vector, limit))
            .await
    }

    /// Search several bound fields at once.
    ///
    /// Each field contributes a prefetch of `limit` candidates; the union is
    /// re-ranked by the first field's slot. When the collection declares
    /// payload indexes, candidates must also share at least one keyword of
    /// the query in their `tokens` field. Bindings that share one provider
    /// instance reuse a single query embedding.
    pub async fn hybrid_search(
        &self,
        collection: &str,
        text: &str,
        fields: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<ScoredPoint>> {
        let config = self.collections.config(collection)?;
        if fields.is_empty() {
            return Err(Error::invalid_data("hybrid search needs at least one field"));
        }
        let bindings = fields
            .iter()
            .map(|f| {
                config
                    .binding_for_field(f)
                    .ok_or_else(|| Error::unknown_binding_field(collection, *f))
            })
            .collect::<Result<Vec<&EmbeddingBinding>>>()?;

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(bindings.len());
        for (i, binding) in bindings.iter().enumerate() {
            let reusable = bindings[..i]
                .iter()
                .position(|earlier| earlier.shares_provider(binding) && earlier.size() == binding.size());
            let vector = match reusable.and_then(|j| vectors.get(j)) {
                Some(v) => v.clone(),
                None => binding.embed_query(text).await?,
            };
            vectors.push(vector);
        }

        let limit = limit.unwrap_or(self.options.default_limit);
        let prefetch: Vec<Prefetch> = bindings
            .iter()
            .zip(&vectors)
            .map(|(b, v)| Prefetch {
                vector: v.clone(),
                using: b.slot().to_string(),
                limit,
            })
            .collect();

        let filter = if config.has_payload_indexes() {
            let tokens = self.tokenizer.tokenize(text);
            (!tokens.is_empty()).then(|| {
                Filter::should(vec![Condition::any(
                    TOKENS_FIELD,
                    tokens.into_iter().map(Value::String).collect(),
                )])
            })
        } else {
            None
        };

        let query = VectorQuery {
            vector: vectors.swap_remove(0),
            using: bindings[0].slot().to_string(),
            limit,
            filter,
            prefetch,
        };
        self.index().query(collection, query).await
    }

    /// Points whose payload satisfies every entry of `matches`.
    ///
    /// Entries are plain values (equality) or `{"$in": [...]}` (membership).
    /// Returns at most `scroll_limit` points, in no particular order.
    pub async fn must_search(
        &self,
        collection: &str,
        matches: &BTreeMap<String, FieldMatch>,
    ) -> Result<Vec<StoredPoint>> {
        let config = self.collections.config(collection)?;
        require_fields(&config, matches.keys().map(String::as_str))?;

        let filter = (!matches.is_empty()).then(|| Filter::from_matches(matches));
        self.index()
            .scroll(collection, ScrollRequest::new(filter, self.options.scroll_limit))
            .await
    }

    /// Up to `scroll_limit` points of the collection.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<StoredPoint>> {
        self.collections.config(collection)?;
        self.index()
            .scroll(collection, ScrollRequest::new(None, self.options.scroll_limit))
            .await
    }

    /// Delete points by id.
    pub async fn delete_by_ids(&self, collection: &str, ids: Vec<PointId>) -> Result<()> {
        self.collections.config(collection)?;
        if ids.is_empty() {
            return Ok(());
        }
        let count = ids.len();
        self.index()
            .delete(collection, PointSelector::Ids(ids))
            .await?;
        log::info!("Deleted {count} point(s) from '{collection}'");
        Ok(())
    }

    /// Delete every point matching `matches`.
    ///
    /// An empty map is refused rather than treated as "delete everything".
    pub async fn delete_by_filter(
        &self,
        collection: &str,
        matches: &BTreeMap<String, FieldMatch>,
    ) -> Result<()> {
        let config = self.collections.config(collection)?;
        if matches.is_empty() {
            return Err(Error::invalid_data("delete filter must not be empty"));
        }
        require_fields(&config, matches.keys().map(String::as_str))?;

        self.index()
            .delete(collection, PointSelector::Filter(Filter::from_matches(matches)))
            .await?;
        log::info!("Deleted points matching {matches:?} from '{collection}'");
        Ok(())
    }
}
