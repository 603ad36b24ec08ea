//! Produced values and the documents they accumulate into
//!
//! Source documents stay `serde_json::Value`. Everything the engine produces is
//! one of the four shapes of [`Value`], so consumers never have to guess what
//! sits under a key. [`Document`] is ordered, which makes flattening and
//! serialisation deterministic without any extra sorting.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;

use crate::error::Error;
use crate::Result;

/// Nested string-keyed document of produced values
pub type Document = BTreeMap<String, Value>;

/// A produced binding value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A single string
    Scalar(String),
    /// Flat string-to-string map
    StringMap(BTreeMap<String, String>),
    /// Ordered list of strings
    StringList(Vec<String>),
    /// Arbitrarily nested document
    Document(Document),
}

impl Value {
    /// Convert a JSON sub-tree into a value
    ///
    /// Scalars are stringified, objects become documents, arrays of scalars
    /// become string lists and any other array becomes a document keyed by
    /// element index. `null` has no representation and yields `None`, and
    /// nulls nested inside containers are dropped.
    pub fn from_json(json: &Json) -> Option<Self> {
        match json {
            Json::Null => None,
            Json::Object(map) => Some(Self::Document(
                map.iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
            Json::Array(items) => match items.iter().map(scalar_string).collect::<Option<Vec<_>>>() {
                Some(list) => Some(Self::StringList(list)),
                None => Some(Self::Document(
                    items
                        .iter()
                        .enumerate()
                        .filter_map(|(i, v)| Self::from_json(v).map(|v| (i.to_string(), v)))
                        .collect(),
                )),
            },
            scalar => scalar_string(scalar).map(Self::Scalar),
        }
    }

    /// Take the string of a scalar value, failing for any other shape
    pub fn expect_scalar(self, path: impl ToString) -> Result<String> {
        match self {
            Self::Scalar(s) => Ok(s),
            _ => Err(Error::invalid_type(path, "string")),
        }
    }

    /// Take a flat map of strings, failing for any other shape
    ///
    /// A document qualifies when every entry is a scalar.
    pub fn expect_string_map(self, path: impl ToString) -> Result<BTreeMap<String, String>> {
        match self {
            Self::StringMap(map) => Ok(map),
            Self::Document(doc) => {
                let path = path.to_string();
                doc.into_iter()
                    .map(|(k, v)| {
                        let entry = format!("{path}.{k}");
                        v.expect_scalar(entry).map(|s| (k, s))
                    })
                    .collect()
            }
            _ => Err(Error::invalid_type(path, "map of strings")),
        }
    }

    /// Returns true for the map-like shapes that spread into a document
    pub fn is_map(&self) -> bool {
        matches!(self, Self::StringMap(_) | Self::Document(_))
    }

    /// Convert back into JSON
    pub fn to_json(&self) -> Json {
        match self {
            Self::Scalar(s) => Json::String(s.clone()),
            Self::StringMap(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Json::String(v.clone())))
                    .collect(),
            ),
            Self::StringList(list) => Json::Array(list.iter().cloned().map(Json::String).collect()),
            Self::Document(doc) => document_to_json(doc),
        }
    }

    /// View a map-like value as a document; other shapes yield `None`
    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Document(doc) => Some(doc),
            Self::StringMap(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, Self::Scalar(v)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Convert a document into a JSON object
pub fn document_to_json(doc: &Document) -> Json {
    Json::Object(doc.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Stringify a JSON scalar; containers and null yield `None`
pub(crate) fn scalar_string(json: &Json) -> Option<String> {
    match json {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::StringMap(map)
    }
}

impl From<Vec<String>> for Value {
    fn from(list: Vec<String>) -> Self {
        Self::StringList(list)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Document(doc)
    }
}

/// How [`merge`] resolves a key present on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOptions {
    /// Incoming leaves replace existing ones
    pub overwrite: bool,
    /// Incoming lists are appended to existing lists instead of replacing them
    pub append_lists: bool,
}

impl MergeOptions {
    /// Later values win and lists grow; used when accumulating service values
    pub const ACCUMULATE: Self = Self {
        overwrite: true,
        append_lists: true,
    };

    /// Existing values are kept and lists grow
    pub const PRESERVE: Self = Self {
        overwrite: false,
        append_lists: true,
    };
}

/// Recursively merge `src` into `dst`
///
/// Map-like values on both sides are merged key by key. Two lists are
/// concatenated when `append_lists` is set. Any other collision keeps the
/// existing value unless `overwrite` is set.
pub fn merge(dst: &mut Document, src: Document, opts: MergeOptions) {
    for (key, incoming) in src {
        match dst.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
            }
            Entry::Occupied(mut slot) => merge_value(slot.get_mut(), incoming, opts),
        }
    }
}

fn merge_value(existing: &mut Value, incoming: Value, opts: MergeOptions) {
    match (existing, incoming) {
        (Value::StringMap(dst), Value::StringMap(src)) => {
            for (k, v) in src {
                match dst.entry(k) {
                    Entry::Vacant(slot) => {
                        slot.insert(v);
                    }
                    Entry::Occupied(mut slot) if opts.overwrite => {
                        slot.insert(v);
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }
        (Value::StringList(dst), Value::StringList(src)) if opts.append_lists => dst.extend(src),
        (existing, incoming) if existing.is_map() && incoming.is_map() => {
            let mut doc = std::mem::replace(existing, Value::Document(Document::new()))
                .into_document()
                .unwrap_or_default();
            merge(&mut doc, incoming.into_document().unwrap_or_default(), opts);
            *existing = Value::Document(doc);
        }
        (existing, incoming) if opts.overwrite => *existing = incoming,
        _ => {}
    }
}
