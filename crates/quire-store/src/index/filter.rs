//! Payload filters.
//!
//! The shape mirrors the vector index service's JSON filter language, so
//! [`Filter`] serializes directly into request bodies:
//!
//! ```json
//! {"must": [{"key": "type_source", "match": {"value": "pdf файл"}}],
//!  "should": [{"key": "tokens", "match": {"any": ["rust", "async"]}}]}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Payload;

/// A conjunction of `must` conditions and a disjunction of `should` ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Every condition must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,

    /// At least one condition must hold, when any are given.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Condition>,
}

impl Filter {
    /// Filter requiring every condition.
    pub fn must(conditions: Vec<Condition>) -> Self {
        Self {
            must: conditions,
            should: Vec::new(),
        }
    }

    /// Filter requiring at least one condition.
    pub fn should(conditions: Vec<Condition>) -> Self {
        Self {
            must: Vec::new(),
            should: conditions,
        }
    }

    /// Conjunctive filter from a field → match map.
    pub fn from_matches(matches: &BTreeMap<String, FieldMatch>) -> Self {
        Self::must(
            matches
                .iter()
                .map(|(key, m)| m.to_condition(key))
                .collect(),
        )
    }

    /// True when the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty()
    }

    /// Evaluate the filter against a payload.
    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && (self.should.is_empty() || self.should.iter().any(|c| c.matches(payload)))
    }
}

/// A match on one payload key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Payload key.
    pub key: String,

    /// What the value must match.
    #[serde(rename = "match")]
    pub matcher: Match,
}

impl Condition {
    /// Exact value match.
    pub fn value(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            matcher: Match::Value {
                value: value.into(),
            },
        }
    }

    /// Match any of the listed values.
    pub fn any(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            matcher: Match::Any { any: values },
        }
    }

    /// Evaluate against a payload. Array payload values match when any
    /// element matches; a missing key never matches.
    pub fn matches(&self, payload: &Payload) -> bool {
        let Some(stored) = payload.get(&self.key) else {
            return false;
        };
        match stored {
            Value::Array(items) => items.iter().any(|item| self.matcher.accepts(item)),
            other => self.matcher.accepts(other),
        }
    }
}

/// Match clause of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Match {
    /// Any of several values.
    Any {
        /// Accepted values.
        any: Vec<Value>,
    },
    /// A single value.
    Value {
        /// Accepted value.
        value: Value,
    },
}

impl Match {
    fn accepts(&self, stored: &Value) -> bool {
        match self {
            Match::Value { value } => values_equal(value, stored),
            Match::Any { any } => any.iter().any(|v| values_equal(v, stored)),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// One entry of a `must_search` request.
///
/// Deserializes from either a plain value or `{"$in": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMatch {
    /// The field equals any of the values.
    In {
        /// Accepted values.
        #[serde(rename = "$in")]
        values: Vec<Value>,
    },
    /// The field equals the value.
    Exact(Value),
}

impl FieldMatch {
    /// Condition on `key` equivalent to this match.
    pub fn to_condition(&self, key: &str) -> Condition {
        match self {
            FieldMatch::In { values } => Condition::any(key, values.clone()),
            FieldMatch::Exact(value) => Condition::value(key, value.clone()),
        }
    }
}

impl From<Value> for FieldMatch {
    fn from(value: Value) -> Self {
        match serde_json::from_value::<FieldMatch>(value.clone()) {
            Ok(parsed) => parsed,
            Err(_) => FieldMatch::Exact(value),
        }
    }
}

impl From<&str> for FieldMatch {
    fn from(value: &str) -> Self {
        FieldMatch::Exact(Value::String(value.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("fixtures are objects"),
        }
    }

    #[test]
    fn test_filter_serialization() {
        let filter = Filter {
            must: vec![Condition::value("type_source", "pdf файл")],
            should: vec![Condition::any("tokens", vec![json!("rust")])],
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "must": [{"key": "type_source", "match": {"value": "pdf файл"}}],
                "should": [{"key": "tokens", "match": {"any": ["rust"]}}]
            })
        );
        let empty = serde_json::to_value(Filter::default()).unwrap();
        assert_eq!(empty, json!({}));
    }

    #[test]
    fn test_must_and_should() {
        let filter = Filter {
            must: vec![Condition::value("kind", "a")],
            should: vec![
                Condition::value("lang", "ru"),
                Condition::value("lang", "en"),
            ],
        };
        assert!(filter.matches(&payload(json!({"kind": "a", "lang": "en"}))));
        assert!(!filter.matches(&payload(json!({"kind": "a", "lang": "de"}))));
        assert!(!filter.matches(&payload(json!({"kind": "b", "lang": "ru"}))));
    }

    #[test]
    fn test_array_payload_matches_any_element() {
        let cond = Condition::any("tokens", vec![json!("tokio"), json!("serde")]);
        assert!(cond.matches(&payload(json!({"tokens": ["rust", "serde"]}))));
        assert!(!cond.matches(&payload(json!({"tokens": ["rust"]}))));
        assert!(!cond.matches(&payload(json!({"tokens": null}))));
        assert!(!cond.matches(&payload(json!({}))));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let cond = Condition::value("course_id", 42);
        assert!(cond.matches(&payload(json!({"course_id": 42.0}))));
    }

    #[test]
    fn test_field_match_parsing() {
        let parsed: BTreeMap<String, FieldMatch> = serde_json::from_value(json!({
            "type_source": "pdf файл",
            "source": {"$in": ["a", "b"]}
        }))
        .unwrap();
        assert_eq!(parsed["type_source"], FieldMatch::Exact(json!("pdf файл")));
        assert_eq!(
            parsed["source"],
            FieldMatch::In {
                values: vec![json!("a"), json!("b")]
            }
        );

        let filter = Filter::from_matches(&parsed);
        assert_eq!(filter.must.len(), 2);
        assert!(filter.matches(&payload(json!({"type_source": "pdf файл", "source": "b"}))));
        assert!(!filter.matches(&payload(json!({"type_source": "pdf файл", "source": "c"}))));
    }

    #[test]
    fn test_field_match_from_value() {
        assert_eq!(
            FieldMatch::from(json!({"$in": [1, 2]})),
            FieldMatch::In {
                values: vec![json!(1), json!(2)]
            }
        );
        assert_eq!(FieldMatch::from(json!(7)), FieldMatch::Exact(json!(7)));
        assert_eq!(FieldMatch::from("x"), FieldMatch::Exact(json!("x")));
    }
}
