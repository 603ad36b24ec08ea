//! Value production
//!
//! Evaluates one [`Extraction`] against a service document. Strategies that
//! read from a related Secret or ConfigMap fetch it through the configured
//! [`ResourceFetcher`], in the service's own namespace.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value as Json;
use tracing::{debug, Span};

use binding_common::DATA_FIELD;

use crate::document::{scalar_string, Value};
use crate::error::Error;
use crate::fetcher::{ObjectRef, ResourceFetcher};
use crate::path::Path;
use crate::Result;

/// Related resource kinds that hold binding data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Values are base64 encoded
    Secret,
    /// Values are plain text
    ConfigMap,
}

impl DataSource {
    /// Kubernetes kind
    pub fn kind(self) -> &'static str {
        match self {
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
        }
    }

    fn object_ref(self, namespace: &str, name: &str) -> ObjectRef {
        match self {
            Self::Secret => ObjectRef::secret(namespace, name),
            Self::ConfigMap => ObjectRef::config_map(namespace, name),
        }
    }

    fn decode(self, key: &str, raw: &str) -> Result<String> {
        match self {
            Self::ConfigMap => Ok(raw.to_string()),
            Self::Secret => {
                let bytes = STANDARD.decode(raw).map_err(|e| Error::DecodingFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                String::from_utf8(bytes).map_err(|e| Error::DecodingFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// How the value at a path is turned into a [`Value`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Stringify the scalar at the path
    Scalar,
    /// Read `key` from the data of the related resource named at the path
    ScalarFromData {
        /// Related resource kind
        source: DataSource,
        /// Data key to read
        key: String,
    },
    /// Read the map at the path as a string map
    StringMap,
    /// Return the whole data section of the related resource named at the path
    MapFromData {
        /// Related resource kind
        source: DataSource,
    },
    /// Fold an array of maps into one map
    SliceOfMaps {
        /// Field of each element used as the output key
        key: String,
        /// Field of each element used as the output value
        value: String,
    },
    /// Collect one field of every element of an array of maps
    SliceOfStrings {
        /// Field collected from each element
        value: String,
    },
    /// Copy whatever sub-tree sits at the path
    Subtree,
}

/// A path paired with the strategy that reads it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Location in the service document
    pub path: Path,
    /// What to do with what's found there
    pub strategy: Strategy,
}

impl Extraction {
    /// Create an extraction
    pub fn new(path: Path, strategy: Strategy) -> Self {
        Self { path, strategy }
    }
}

/// Evaluates extractions against service documents
pub struct ValueProducer {
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    span: Span,
}

impl ValueProducer {
    /// Create a producer
    ///
    /// Without a fetcher, strategies that need a related resource fail with
    /// `MissingClient`. Events are emitted under `parent`.
    pub fn new(fetcher: Option<Arc<dyn ResourceFetcher>>, parent: Span) -> Self {
        let span = tracing::debug_span!(parent: &parent, "value_producer");
        Self { fetcher, span }
    }

    /// Evaluate `extraction` against `doc`
    pub async fn produce(&self, extraction: &Extraction, doc: &Json) -> Result<Value> {
        let path = &extraction.path;
        debug!(parent: &self.span, path = %path, strategy = ?extraction.strategy, "producing value");

        match &extraction.strategy {
            Strategy::Scalar => {
                let found = lookup(path, doc)?;
                value_at(path, &found)?.expect_scalar(path).map(Value::Scalar)
            }
            Strategy::StringMap => {
                let found = lookup(path, doc)?;
                value_at(path, &found)?
                    .expect_string_map(path)
                    .map(Value::StringMap)
            }
            Strategy::SliceOfMaps { key, value } => {
                let mut out = BTreeMap::new();
                for element in map_elements(path, doc)? {
                    out.insert(
                        element_field(path, &element, key)?,
                        element_field(path, &element, value)?,
                    );
                }
                Ok(Value::StringMap(out))
            }
            Strategy::SliceOfStrings { value } => map_elements(path, doc)?
                .into_iter()
                .map(|element| element_field(path, &element, value))
                .collect::<Result<Vec<_>>>()
                .map(Value::StringList),
            Strategy::Subtree => {
                let found = lookup(path, doc)?;
                Value::from_json(&found).ok_or_else(|| Error::path_not_found(path))
            }
            Strategy::ScalarFromData { source, key } => {
                let mut data = self.related_data(*source, path, doc).await?;
                let raw = data
                    .remove(key)
                    .ok_or_else(|| Error::path_not_found(format!("{DATA_FIELD}.{key}")))?;
                source.decode(key, &raw).map(Value::Scalar)
            }
            Strategy::MapFromData { source } => self
                .related_data(*source, path, doc)
                .await?
                .into_iter()
                .map(|(k, v)| source.decode(&k, &v).map(|decoded| (k, decoded)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Value::StringMap),
        }
    }

    /// Fetch the related resource named at `path` and return its raw data section
    ///
    /// Values are returned as stored; Secret values still need decoding.
    async fn related_data(
        &self,
        source: DataSource,
        path: &Path,
        doc: &Json,
    ) -> Result<BTreeMap<String, String>> {
        let fetcher = self.fetcher.as_ref().ok_or_else(|| Error::MissingClient {
            kind: source.kind().to_string(),
        })?;

        let name = match path.lookup(doc) {
            None | Some(Json::Null) => {
                return Err(Error::SecondaryResourceNameFieldNotFound {
                    path: path.to_string(),
                })
            }
            Some(Json::String(name)) => name,
            Some(_) => return Err(Error::invalid_type(path, "string")),
        };
        let namespace = doc
            .pointer("/metadata/namespace")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::path_not_found("metadata.namespace"))?;

        debug!(
            parent: &self.span,
            kind = source.kind(),
            namespace = %namespace,
            name = %name,
            "fetching related resource"
        );
        let target = source.object_ref(namespace, &name);
        let resource = fetcher
            .get(&target)
            .await
            .map_err(|e| Error::SecondaryResourceFetchFailed {
                kind: source.kind().to_string(),
                namespace: namespace.to_string(),
                name: name.clone(),
                source: e,
            })?;

        match resource.get(DATA_FIELD) {
            None | Some(Json::Null) => Err(Error::path_not_found(DATA_FIELD)),
            Some(data) => value_at(DATA_FIELD, data)?.expect_string_map(DATA_FIELD),
        }
    }
}

fn lookup(path: &Path, doc: &Json) -> Result<Json> {
    match path.lookup(doc) {
        None | Some(Json::Null) => Err(Error::path_not_found(path)),
        Some(found) => Ok(found),
    }
}

fn value_at(path: impl ToString, found: &Json) -> Result<Value> {
    Value::from_json(found).ok_or_else(|| Error::path_not_found(path))
}

fn map_elements(path: &Path, doc: &Json) -> Result<Vec<serde_json::Map<String, Json>>> {
    let Json::Array(items) = lookup(path, doc)? else {
        return Err(Error::invalid_type(path, "array of maps"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Json::Object(map) => Ok(map),
            _ => Err(Error::invalid_type(path, "array of maps")),
        })
        .collect()
}

fn element_field(
    path: &Path,
    element: &serde_json::Map<String, Json>,
    field: &str,
) -> Result<String> {
    element
        .get(field)
        .and_then(scalar_string)
        .ok_or_else(|| Error::invalid_type(path.join(field), "string"))
}
