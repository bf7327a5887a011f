//! Metadata value model: a small tagged union covering the dynamically
//! typed values a note's front-matter can hold, plus the ordered map that
//! carries them. `indexmap::IndexMap` stands in for the teacher's
//! `HashMap<String, serde_yaml::Value>` (see `note::frontmatter`'s
//! `custom` field) wherever key order must survive a round trip.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An ordered front-matter/metadata map. Iteration order is insertion
/// order, which is what the front-matter codec relies on to reproduce
/// the original key order on serialization (spec §4.1).
pub type MetadataMap = IndexMap<String, MetadataValue>;

/// A typed link entry, used for the `link-list` metadata shape (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

/// The metadata value tagged union from spec §3: "string | number | boolean
/// | null | ordered-list-of-scalars | nested-object | link-list".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    List(Vec<MetadataValue>),
    Map(MetadataMap),
    LinkList(Vec<LinkRef>),
}

impl MetadataValue {
    /// The `value_type` tag stored alongside the serialized value in
    /// `note_metadata` (spec §4.6).
    pub fn value_type(&self) -> &'static str {
        match self {
            MetadataValue::String(_) => "string",
            MetadataValue::Number(_) => "number",
            MetadataValue::Bool(_) => "boolean",
            MetadataValue::Null => "null",
            MetadataValue::List(_) => "list",
            MetadataValue::Map(_) => "map",
            MetadataValue::LinkList(_) => "link_list",
        }
    }

    /// JSON-encode the value for storage in `note_metadata.value` and for
    /// canonicalization in the content-hash engine (scalars serialize
    /// exactly; composite values are JSON round-tripped, per spec §3).
    pub fn to_serialized(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }

    /// Inverse of [`to_serialized`], dispatching on the stored `value_type`
    /// tag rather than re-sniffing the JSON shape, so a string that
    /// happens to look like a number still deserializes as a string.
    pub fn from_serialized(value_type: &str, raw: &str) -> Self {
        match value_type {
            "string" => serde_json::from_str(raw)
                .unwrap_or_else(|_| MetadataValue::String(raw.to_string())),
            "number" => serde_json::from_str(raw).unwrap_or(MetadataValue::Null),
            "boolean" => serde_json::from_str(raw).unwrap_or(MetadataValue::Null),
            "null" => MetadataValue::Null,
            "list" => serde_json::from_str::<Vec<MetadataValue>>(raw)
                .map(MetadataValue::List)
                .unwrap_or(MetadataValue::List(Vec::new())),
            "map" => serde_json::from_str::<MetadataMap>(raw)
                .map(MetadataValue::Map)
                .unwrap_or(MetadataValue::Map(MetadataMap::new())),
            "link_list" => serde_json::from_str::<Vec<LinkRef>>(raw)
                .map(MetadataValue::LinkList)
                .unwrap_or(MetadataValue::LinkList(Vec::new())),
            _ => MetadataValue::Null,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_round_trip_scalars() {
        for v in [
            MetadataValue::String("hello".into()),
            MetadataValue::Number(42.5),
            MetadataValue::Bool(true),
            MetadataValue::Null,
        ] {
            let raw = v.to_serialized();
            let back = MetadataValue::from_serialized(v.value_type(), &raw);
            assert_eq!(v, back);
        }
    }

    #[test]
    fn serialized_round_trip_composite() {
        let list = MetadataValue::List(vec!["a".into(), "b".into()]);
        let raw = list.to_serialized();
        assert_eq!(
            MetadataValue::from_serialized(list.value_type(), &raw),
            list
        );

        let mut map = MetadataMap::new();
        map.insert("x".to_string(), MetadataValue::Number(1.0));
        map.insert("y".to_string(), MetadataValue::String("z".into()));
        let mv = MetadataValue::Map(map);
        let raw = mv.to_serialized();
        assert_eq!(MetadataValue::from_serialized(mv.value_type(), &raw), mv);
    }

    #[test]
    fn string_that_looks_numeric_round_trips_as_string() {
        let v = MetadataValue::String("007".into());
        let raw = v.to_serialized();
        assert_eq!(MetadataValue::from_serialized("string", &raw), v);
    }
}
