//! Dotted addresses into nested documents
//!
//! A [`Path`] is built from strings such as `status.dbCredentials.username` or
//! `status.bootstrap.*.url`. Segments that parse as integers double as array
//! indexes and `*` matches every element of an array. Construction never
//! fails: empty segments become empty fields, which simply never match.

use std::fmt;

use serde_json::Value as Json;

use crate::document::{Document, Value};

/// Segment name that matches every element of an array
pub const WILDCARD: &str = "*";

/// One node of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Segment as written
    pub name: String,
    /// Integer reading of `name`, when it has one
    pub index: Option<usize>,
}

impl Field {
    /// Create a field, recording its index when the name is numeric
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let index = name.parse::<usize>().ok();
        Self { name, index }
    }

    /// Returns true for the `*` segment
    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD
    }

    /// Returns true for a segment that was empty in the source string
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Immutable sequence of [`Field`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Field>);

impl Path {
    /// Split a dotted string into a path
    pub fn new(s: &str) -> Self {
        Self(s.split('.').map(Field::new).collect())
    }

    /// Parse the path form used inside annotation values
    ///
    /// Accepts both `{.status.host}` and `status.host`: braces and dots at
    /// either end are stripped before segmenting.
    pub fn from_annotation(s: &str) -> Self {
        Self::new(s.trim_matches(|c| c == '{' || c == '}' || c == '.'))
    }

    /// The fields of this path
    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the path has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First field
    pub fn head(&self) -> Option<&Field> {
        self.0.first()
    }

    /// Everything after the first field
    pub fn tail(&self) -> Path {
        match self.0.split_first() {
            Some((_, rest)) => Self(rest.to_vec()),
            None => Self::default(),
        }
    }

    /// Returns true when there is something after the head
    pub fn has_tail(&self) -> bool {
        self.0.len() > 1
    }

    /// The path without a leading wildcard
    pub fn adjusted(&self) -> Path {
        match self.head() {
            Some(head) if head.is_wildcard() => self.tail(),
            _ => self.clone(),
        }
    }

    /// Only the named map keys: wildcards and index segments are dropped
    pub fn clean(&self) -> Path {
        Self(
            self.adjusted()
                .0
                .into_iter()
                .filter(|f| f.index.is_none() && !f.is_wildcard())
                .collect(),
        )
    }

    /// Last field
    pub fn last_field(&self) -> Option<&Field> {
        self.0.last()
    }

    /// Everything before the last field; empty for paths of one field
    pub fn base_path(&self) -> Path {
        match self.0.split_last() {
            Some((_, base)) => Self(base.to_vec()),
            None => Self::default(),
        }
    }

    /// Split into `(base_path, last_field)`
    pub fn decompose(&self) -> (Path, Option<&Field>) {
        (self.base_path(), self.last_field())
    }

    /// Append a field, returning the extended path
    pub fn join(&self, field: impl Into<String>) -> Path {
        let mut fields = self.0.clone();
        fields.push(Field::new(field));
        Self(fields)
    }

    /// Resolve this path against a JSON document
    ///
    /// Objects are traversed by name and arrays by index. A wildcard over an
    /// array maps the remaining path across every element and collects the
    /// results that resolved, in array order. Empty fields never match.
    pub fn lookup(&self, doc: &Json) -> Option<Json> {
        lookup_fields(&self.adjusted().0, doc)
    }

    /// Build the sparse document holding `value` at this path
    ///
    /// Only the cleaned segments are used. A path with no named segments
    /// yields the value itself when it's a document, else an empty document.
    pub fn compose(&self, value: Value) -> Document {
        let clean = self.clean();
        let Some((last, base)) = clean.0.split_last() else {
            return match value {
                Value::Document(doc) => doc,
                _ => Document::new(),
            };
        };

        let mut doc = Document::new();
        doc.insert(last.name.clone(), value);
        for field in base.iter().rev() {
            let mut parent = Document::new();
            parent.insert(field.name.clone(), Value::Document(doc));
            doc = parent;
        }
        doc
    }
}

fn lookup_fields(fields: &[Field], doc: &Json) -> Option<Json> {
    let Some((head, rest)) = fields.split_first() else {
        return Some(doc.clone());
    };
    if head.is_empty() {
        return None;
    }

    match doc {
        Json::Object(map) => map.get(&head.name).and_then(|v| lookup_fields(rest, v)),
        Json::Array(items) if head.is_wildcard() => Some(Json::Array(
            items
                .iter()
                .filter_map(|item| lookup_fields(rest, item))
                .collect(),
        )),
        Json::Array(items) => head
            .index
            .and_then(|i| items.get(i))
            .and_then(|v| lookup_fields(rest, v)),
        _ => None,
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&field.name)?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
