//! Write paths: raw ingest, conditional update, and incremental sync.

use std::collections::HashMap;

use quire_core::{Error, Result};
use serde_json::Value;
use uuid::Uuid;

use super::{BatchWriter, DocumentStore, build_point, describe_key, require_fields, natural_id};
use crate::binding::EmbeddingCache;
use crate::collection::CollectionConfig;
use crate::index::{Condition, Direction, Filter, OrderBy, PointId, ScrollRequest, StoredPoint};
use crate::schema::{RawRecord, Record};

/// A raw record that failed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// Position in the input slice.
    pub index: usize,
    /// Why it was rejected.
    pub message: String,
}

/// Outcome of [`DocumentStore::ingest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Points written.
    pub inserted: usize,
    /// Records skipped for schema errors.
    pub rejected: Vec<Rejected>,
}

/// Outcome of [`DocumentStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Existing points overwritten.
    pub updated: usize,
    /// New points written.
    pub added: usize,
    /// Records whose check fields matched the stored point.
    pub unchanged: usize,
    /// Records skipped for schema errors.
    pub rejected: Vec<Rejected>,
}

/// Counts of an applied [`DocumentStore::sync_newer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Stored maximum of the recency field before the sync.
    pub stored_max: f64,
    /// Existing points overwritten.
    pub updated: usize,
    /// New points written.
    pub added: usize,
    /// Records not newer than what is stored.
    pub skipped: usize,
    /// Records skipped for schema errors.
    pub rejected: Vec<Rejected>,
}

/// Result of [`DocumentStore::sync_newer`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Nothing in the batch is newer than the stored maximum; no write made.
    Stale {
        /// Stored maximum of the recency field.
        stored_max: f64,
        /// Maximum of the batch, `None` when no valid record carries one.
        batch_max: Option<f64>,
    },
    /// The newer records were written.
    Applied(SyncReport),
}

/// Construct every raw record, splitting schema failures from the rest.
fn construct_all(config: &CollectionConfig, raws: &[RawRecord]) -> Result<(Vec<Record>, Vec<Rejected>)> {
    let mut records = Vec::with_capacity(raws.len());
    let mut rejected = Vec::new();
    for (index, raw) in raws.iter().enumerate() {
        match config.kind().construct(raw) {
            Ok(record) => records.push(record),
            Err(e) if e.is_schema_violation() => {
                log::warn!(
                    "Rejected record {index} for collection '{}': {e}",
                    config.name()
                );
                rejected.push(Rejected {
                    index,
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok((records, rejected))
}

impl DocumentStore {
    /// Validate, embed and write raw records as new points.
    ///
    /// Invalid records are reported in [`IngestReport::rejected`] and do not
    /// stop the others. Points are written in batches of `batch_size`; a
    /// failing batch aborts the call and earlier batches stay written.
    pub async fn ingest(&self, collection: &str, raws: &[RawRecord]) -> Result<IngestReport> {
        let config = self.collections.config(collection)?;
        let (records, rejected) = construct_all(&config, raws)?;

        let mut cache = EmbeddingCache::new();
        let mut writer = BatchWriter::new(self.index(), collection, self.options.batch_size);
        for record in &records {
            let point = build_point(&config, record, &mut cache, PointId::Uuid(Uuid::new_v4())).await?;
            writer.push(point).await?;
        }
        let inserted = writer.finish().await?;

        log::info!(
            "Ingested {inserted} record(s) into '{collection}', rejected {}",
            rejected.len()
        );
        Ok(IngestReport { inserted, rejected })
    }

    /// Write records that are new or changed.
    ///
    /// Each record is matched to at most one stored point by the values of
    /// `compare_fields` (null values are left out of the match). A matched
    /// point is left alone when every `check_fields` value equals the stored
    /// payload; otherwise it is overwritten under its existing id. Unmatched
    /// records are written under an id derived from their compare values, so
    /// concurrent updates of the same record address the same point.
    pub async fn update(
        &self,
        collection: &str,
        raws: &[RawRecord],
        compare_fields: &[&str],
        check_fields: &[&str],
    ) -> Result<UpdateReport> {
        let config = self.collections.config(collection)?;
        require_fields(&config, compare_fields.iter().chain(check_fields).copied())?;
        let (records, rejected) = construct_all(&config, raws)?;

        let mut report = UpdateReport {
            rejected,
            ..Default::default()
        };
        let mut cache = EmbeddingCache::new();
        let mut writer = BatchWriter::new(self.index(), collection, self.options.batch_size);

        // Points written earlier in this call, by compare key
        let mut written: HashMap<String, StoredPoint> = HashMap::new();

        for record in &records {
            let key = compare_fields
                .iter()
                .map(|f| record.payload_value(f))
                .collect::<Result<Vec<Value>>>()?;
            let written_key = key
                .iter()
                .any(|v| !v.is_null())
                .then(|| Value::Array(key.clone()).to_string());

            let existing = match written_key.as_ref().and_then(|k| written.get(k)) {
                Some(point) => Some(point.clone()),
                None => self.lookup(collection, compare_fields, &key).await?,
            };

            let id = match existing {
                Some(existing) => {
                    if payload_matches(&existing, record, check_fields)? {
                        log::debug!(
                            "Unchanged record in '{collection}' ({})",
                            describe_key(compare_fields, &key)
                        );
                        report.unchanged += 1;
                        continue;
                    }
                    report.updated += 1;
                    existing.id
                }
                None => {
                    report.added += 1;
                    if written_key.is_some() {
                        natural_id(collection, &key)
                    } else {
                        PointId::Uuid(Uuid::new_v4())
                    }
                }
            };

            let point = build_point(&config, record, &mut cache, id).await?;
            if let Some(k) = written_key {
                written.insert(
                    k,
                    StoredPoint {
                        id,
                        payload: point.payload.clone(),
                    },
                );
            }
            writer.push(point).await?;
        }
        writer.finish().await?;

        log::info!(
            "Updated '{collection}': {} updated, {} added, {} unchanged, {} rejected",
            report.updated,
            report.added,
            report.unchanged,
            report.rejected.len()
        );
        Ok(report)
    }

    /// Write the records of a batch that are newer than anything stored.
    ///
    /// The stored maximum of `timestamp_field` is read first; an empty
    /// collection fails with `EmptyCollection`. When the batch holds nothing
    /// newer the call returns [`SyncOutcome::Stale`] without writing.
    /// Otherwise each newer record replaces the point with the same
    /// `identity_field` value, unless that point is at least as recent.
    /// Of several records sharing an identity only the newest is kept.
    /// All points are written in a single upsert.
    pub async fn sync_newer(
        &self,
        collection: &str,
        raws: &[RawRecord],
        timestamp_field: &str,
        identity_field: Option<&str>,
    ) -> Result<SyncOutcome> {
        let config = self.collections.config(collection)?;
        require_fields(&config, std::iter::once(timestamp_field).chain(identity_field))?;

        let stored_max = self.stored_max(collection, timestamp_field).await?;
        let (records, rejected) = construct_all(&config, raws)?;

        let batch_max = records
            .iter()
            .filter_map(|r| r.get(timestamp_field).ok().and_then(|v| v.as_f64()))
            .fold(None, |max: Option<f64>, t| Some(max.map_or(t, |m| m.max(t))));

        if batch_max.is_none_or(|max| max <= stored_max) {
            log::info!(
                "Nothing newer than {stored_max} to sync into '{collection}' (batch max {batch_max:?})"
            );
            return Ok(SyncOutcome::Stale {
                stored_max,
                batch_max,
            });
        }

        let mut report = SyncReport {
            stored_max,
            rejected,
            ..Default::default()
        };

        // Newest record per identity within the batch
        let mut selected: Vec<(&Record, f64, Option<Value>)> = Vec::new();
        let mut by_identity: HashMap<String, usize> = HashMap::new();
        for record in &records {
            let Some(ts) = record.get(timestamp_field)?.as_f64() else {
                report.skipped += 1;
                continue;
            };
            if ts <= stored_max {
                report.skipped += 1;
                continue;
            }

            let identity = match identity_field {
                Some(field) => Some(record.payload_value(field)?),
                None => None,
            };
            let key = identity
                .as_ref()
                .filter(|v| !v.is_null())
                .map(Value::to_string);
            if let Some(key) = key {
                if let Some(&pos) = by_identity.get(&key) {
                    report.skipped += 1;
                    if selected[pos].1 < ts {
                        selected[pos] = (record, ts, identity);
                    }
                    continue;
                }
                by_identity.insert(key, selected.len());
            }
            selected.push((record, ts, identity));
        }

        let mut cache = EmbeddingCache::new();
        let mut points = Vec::with_capacity(selected.len());
        for (record, ts, identity) in selected {
            let existing = match (identity_field, &identity) {
                (Some(field), Some(value)) => {
                    self.lookup(collection, &[field], std::slice::from_ref(value))
                        .await?
                }
                _ => None,
            };

            let id = match existing {
                Some(point) => {
                    let stored_ts = point.payload.get(timestamp_field).and_then(Value::as_f64);
                    if stored_ts.is_some_and(|s| s >= ts) {
                        report.skipped += 1;
                        continue;
                    }
                    report.updated += 1;
                    point.id
                }
                None => {
                    report.added += 1;
                    match &identity {
                        Some(value) if !value.is_null() => {
                            natural_id(collection, std::slice::from_ref(value))
                        }
                        _ => PointId::Uuid(Uuid::new_v4()),
                    }
                }
            };

            points.push(build_point(&config, record, &mut cache, id).await?);
        }

        // One write: a failure leaves the stored maximum where it was
        if !points.is_empty() {
            self.index().upsert(collection, points).await?;
        }

        log::info!(
            "Synced '{collection}' past {stored_max}: {} updated, {} added, {} skipped, {} rejected",
            report.updated,
            report.added,
            report.skipped,
            report.rejected.len()
        );
        Ok(SyncOutcome::Applied(report))
    }

    /// At most one stored point whose payload matches every non-null key value.
    async fn lookup(
        &self,
        collection: &str,
        fields: &[&str],
        values: &[Value],
    ) -> Result<Option<StoredPoint>> {
        let conditions: Vec<Condition> = fields
            .iter()
            .zip(values)
            .filter(|(_, v)| !v.is_null())
            .map(|(f, v)| Condition::value(*f, v.clone()))
            .collect();
        if conditions.is_empty() {
            return Ok(None);
        }

        let found = self
            .index()
            .scroll(collection, ScrollRequest::new(Some(Filter::must(conditions)), 1))
            .await?;
        Ok(found.into_iter().next())
    }

    /// Largest stored value of `field`.
    async fn stored_max(&self, collection: &str, field: &str) -> Result<f64> {
        let request = ScrollRequest {
            filter: None,
            limit: 1,
            order_by: Some(OrderBy {
                key: field.to_string(),
                direction: Direction::Desc,
            }),
        };
        let newest = self.index().scroll(collection, request).await?;
        let point = newest
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmptyCollection(collection.to_string()))?;

        match point.payload.get(field) {
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| Error::invalid_data(format!("'{field}' of point {} is not finite", point.id))),
            other => Err(Error::invalid_data(format!(
                "'{field}' of point {} is not numeric: {}",
                point.id,
                other.map_or_else(|| "missing".to_string(), Value::to_string)
            ))),
        }
    }
}

/// True when every check field of `record` serializes to the stored value.
fn payload_matches(stored: &StoredPoint, record: &Record, fields: &[&str]) -> Result<bool> {
    for field in fields {
        let current = record.payload_value(field)?;
        let previous = stored.payload.get(*field).unwrap_or(&Value::Null);
        if &current != previous {
            return Ok(false);
        }
    }
    Ok(true)
}
