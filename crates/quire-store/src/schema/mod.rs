//! Schema registry: record kinds, typed coercion, validated records.
//!
//! A [`RecordKind`] is a fixed, ordered list of [`FieldSpec`]s. Applying a
//! kind to a [`RawRecord`] (an untyped JSON object produced upstream) yields
//! a [`Record`] or a schema error:
//!
//! 1. every required key must be present, all missing names are reported;
//! 2. each value is coerced to its declared [`FieldType`];
//! 3. `type_source` is decoded into a [`SourceType`].
//!
//! Construction is pure: the same raw record always yields the same
//! [`Record`].

mod kinds;
mod source;

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use quire_core::{Error, Result};
use serde_json::Value;

pub use kinds::{
    CourseKind, CourseScheduleKind, DocumentKind, ForumQuestionKind, NomenclatureKind,
    QuestionKind, WikiPageKind, all_kinds, kind_by_name,
};
pub use source::SourceType;

/// An untyped field map as produced by the ingestion collaborator.
pub type RawRecord = serde_json::Map<String, Value>;

/// The flattened record stored alongside a point's vectors.
pub type Payload = serde_json::Map<String, Value>;

/// Name of the classification field every kind declares.
pub const SOURCE_TYPE_FIELD: &str = "type_source";

/// Name of the multi-valued keyword field used by hybrid search.
pub const TOKENS_FIELD: &str = "tokens";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

// ============================================================================
// Field declarations
// ============================================================================

/// Declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Free text. Numbers and booleans are stringified.
    Text,
    /// Whole number; numeric strings are accepted.
    Integer,
    /// Boolean flag.
    Bool,
    /// Point in time stored as UNIX seconds.
    Timestamp,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// Time of day, `HH:MM` or `HH:MM:SS`.
    Time,
    /// Arbitrary JSON array; absent or null becomes an empty list.
    List,
    /// Array of keyword strings; absent stays null.
    Keywords,
    /// Any JSON value, stored as given.
    Json,
    /// The [`SourceType`] classification.
    SourceType,
}

/// Whether a field must appear in the raw record and whether it may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Key must be present with a non-null value.
    Required,
    /// Key must be present; the value may be null or empty.
    Nullable,
    /// Key may be absent; absent and null are equivalent.
    Optional,
}

/// One field of a record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name, also the payload key.
    pub name: &'static str,
    /// Declared type.
    pub ty: FieldType,
    /// Presence rule.
    pub presence: Presence,
}

impl FieldSpec {
    /// A field that must be present and non-null.
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Required,
        }
    }

    /// A field that must be present but may be null.
    pub const fn nullable(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Nullable,
        }
    }

    /// A field that may be omitted.
    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Optional,
        }
    }

    /// True when the raw record must contain this key.
    pub fn is_required(&self) -> bool {
        !matches!(self.presence, Presence::Optional)
    }
}

// ============================================================================
// Values
// ============================================================================

/// A coerced field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent optional value.
    Null,
    /// Text.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// Floating point number (timestamps).
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// JSON array.
    List(Vec<Value>),
    /// Arbitrary JSON value.
    Json(Value),
    /// Classification.
    Source(SourceType),
}

impl FieldValue {
    /// True for null and for JSON null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null | FieldValue::Json(Value::Null))
    }

    /// Serialize to the payload representation.
    ///
    /// Dates become `YYYY-MM-DD`, times `HH:MM:SS` and the classification its
    /// wire value, so payload comparisons work on plain JSON.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            FieldValue::Time(t) => Value::String(t.format(TIME_FORMAT).to_string()),
            FieldValue::List(items) => Value::Array(items.clone()),
            FieldValue::Json(v) => v.clone(),
            FieldValue::Source(s) => Value::String(s.as_str().to_string()),
        }
    }

    /// Render the value as text for embedding. `None` for null values.
    ///
    /// Lists are joined with single spaces; non-string list items use their
    /// JSON rendering.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Null | FieldValue::Json(Value::Null) => None,
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::Source(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::List(items) => Some(Cow::Owned(
                items
                    .iter()
                    .map(json_text)
                    .collect::<Vec<_>>()
                    .join(" "),
            )),
            FieldValue::Json(v) => Some(Cow::Owned(json_text(v))),
            other => match other.to_json() {
                Value::String(s) => Some(Cow::Owned(s)),
                v => Some(Cow::Owned(v.to_string())),
            },
        }
    }

    /// Numeric view, used for recency comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Validated records
// ============================================================================

/// A raw record validated against its kind.
///
/// Holds one value per declared field, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: &'static str,
    values: Vec<(&'static str, FieldValue)>,
}

impl Record {
    /// Name of the kind this record was built by.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Result<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::unknown_field(self.kind, name))
    }

    /// `(field, value)` pairs in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    /// The decoded classification.
    pub fn source_type(&self) -> Option<SourceType> {
        match self.get(SOURCE_TYPE_FIELD) {
            Ok(FieldValue::Source(s)) => Some(*s),
            _ => None,
        }
    }

    /// Payload value of a single field.
    pub fn payload_value(&self, name: &str) -> Result<Value> {
        self.get(name).map(FieldValue::to_json)
    }

    /// Flatten into a payload document containing every declared field.
    pub fn to_payload(&self) -> Payload {
        self.values
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.to_json()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'static str, &'a FieldValue);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.pairs())
    }
}

// ============================================================================
// Record kinds
// ============================================================================

/// A fixed schema for one category of ingested document.
///
/// Implementations only declare a name and a field table; construction is
/// shared. The field table must contain a [`FieldType::SourceType`] field
/// named `type_source` and a text field named `source`.
pub trait RecordKind: Send + Sync + std::fmt::Debug {
    /// Registry name of the kind.
    fn name(&self) -> &'static str;

    /// Declared fields, in payload order.
    fn fields(&self) -> &'static [FieldSpec];

    /// Look up a field declaration.
    fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// True when the kind declares `name`.
    fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Names of all declared fields.
    fn field_names(&self) -> Vec<&'static str> {
        self.fields().iter().map(|f| f.name).collect()
    }

    /// Validate and coerce a raw record.
    fn construct(&self, raw: &RawRecord) -> Result<Record> {
        construct_record(self.name(), self.fields(), raw)
    }
}

/// Shared construction routine behind [`RecordKind::construct`].
pub fn construct_record(
    kind: &'static str,
    fields: &'static [FieldSpec],
    raw: &RawRecord,
) -> Result<Record> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| f.is_required() && !raw.contains_key(f.name))
        .map(|f| f.name)
        .collect();
    if !missing.is_empty() {
        return Err(Error::schema(
            kind,
            format!("missing required fields: {}", missing.join(", ")),
        ));
    }

    let mut values = Vec::with_capacity(fields.len());
    let mut source_slots = Vec::new();
    for field in fields {
        let raw_value = raw.get(field.name);
        if field.ty == FieldType::SourceType {
            source_slots.push(values.len());
            values.push((field.name, FieldValue::Null));
            continue;
        }
        let value =
            coerce(field, raw_value).map_err(|msg| Error::schema(kind, format!("{}: {msg}", field.name)))?;
        values.push((field.name, value));
    }

    for slot in source_slots {
        let name = values[slot].0;
        let decoded = match raw.get(name) {
            Some(Value::String(s)) => s.parse::<SourceType>()?,
            Some(other) => return Err(Error::UnknownSourceType(other.to_string())),
            None => return Err(Error::schema(kind, format!("missing required fields: {name}"))),
        };
        values[slot].1 = FieldValue::Source(decoded);
    }

    Ok(Record { kind, values })
}

/// Coerce one raw value according to its declaration.
fn coerce(field: &FieldSpec, value: Option<&Value>) -> std::result::Result<FieldValue, String> {
    let value = match value {
        None | Some(Value::Null) => return null_value(field),
        Some(v) => v,
    };

    match field.ty {
        FieldType::Text => match value {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
            other => Err(format!("expected text, got {}", type_name(other))),
        },
        FieldType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(FieldValue::Integer)
                .ok_or_else(|| format!("expected an integer, got {n}")),
            Value::String(s) if s.trim().is_empty() => null_value(field),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("expected an integer, got '{s}'")),
            other => Err(format!("expected an integer, got {}", type_name(other))),
        },
        FieldType::Bool => match value {
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Ok(FieldValue::Bool(true)),
                "false" => Ok(FieldValue::Bool(false)),
                "" => null_value(field),
                _ => Err(format!("expected a boolean, got '{s}'")),
            },
            other => Err(format!("expected a boolean, got {}", type_name(other))),
        },
        FieldType::Timestamp => match value {
            Value::String(s) if s.trim().is_empty() => null_value(field),
            other => parse_timestamp(other)
                .map(FieldValue::Float)
                .ok_or_else(|| format!("expected a timestamp, got {other}")),
        },
        FieldType::Date => match value {
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(FieldValue::Date)
                .map_err(|_| format!("expected a YYYY-MM-DD date, got '{s}'")),
            other => Err(format!("expected a date, got {}", type_name(other))),
        },
        FieldType::Time => match value {
            Value::String(s) if s.trim().is_empty() => null_value(field),
            Value::String(s) => parse_time(s.trim())
                .map(FieldValue::Time)
                .ok_or_else(|| format!("expected an HH:MM time, got '{s}'")),
            other => Err(format!("expected a time, got {}", type_name(other))),
        },
        FieldType::List => match value {
            Value::Array(items) => Ok(FieldValue::List(items.clone())),
            other => Err(format!("expected a list, got {}", type_name(other))),
        },
        FieldType::Keywords => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Ok(FieldValue::List(items.clone()))
            }
            Value::Array(_) => Err("expected a list of strings".to_string()),
            other => Err(format!("expected a list of strings, got {}", type_name(other))),
        },
        FieldType::Json => Ok(FieldValue::Json(value.clone())),
        FieldType::SourceType => Err("classification is decoded separately".to_string()),
    }
}

fn null_value(field: &FieldSpec) -> std::result::Result<FieldValue, String> {
    match (field.ty, field.presence) {
        (FieldType::List, _) => Ok(FieldValue::List(Vec::new())),
        (_, Presence::Required) => Err("must not be null".to_string()),
        _ => Ok(FieldValue::Null),
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Interpret a JSON value as UNIX seconds.
///
/// Numbers are taken as-is. Strings may be numeric, ISO 8601 without offset
/// (`2024-05-01T10:00:00`, optionally with fractional seconds or a space
/// separator, read as UTC) or RFC 3339.
pub fn parse_timestamp(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(f) = s.parse::<f64>() {
                return Some(f);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(to_seconds(dt.naive_utc()));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(to_seconds)
        }
        _ => None,
    }
}

fn to_seconds(dt: NaiveDateTime) -> f64 {
    let utc = dt.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_micros()) / 1_000_000.0
}

// ============================================================================
// Tests
// ============================================================================
