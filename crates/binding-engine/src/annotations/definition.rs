//! Key/value binding grammar
//!
//! `path={.status.dbCredentials},objectType=Secret,sourceKey=password`
//!
//! Recognised keys are `path`, `objectType`, `elementType`, `sourceKey` and
//! `sourceValue`. `path` is mandatory, everything else has a default.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::path::Path;
use crate::producer::{DataSource, Extraction, Strategy};
use crate::Result;

/// Separators between keys and values, and between pairs
static TOKEN_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[=,]").expect("token separator pattern is valid"));

const PATH_KEY: &str = "path";
const OBJECT_TYPE_KEY: &str = "objectType";
const ELEMENT_TYPE_KEY: &str = "elementType";
const SOURCE_KEY_KEY: &str = "sourceKey";
const SOURCE_VALUE_KEY: &str = "sourceValue";

/// Where the value at `path` lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectType {
    /// Directly in the service document
    #[default]
    String,
    /// In a Secret named by the value at `path`
    Secret,
    /// In a ConfigMap named by the value at `path`
    ConfigMap,
}

impl ObjectType {
    /// Parse an `objectType` token; empty means the default
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "" | "string" => Ok(Self::String),
            "secret" => Ok(Self::Secret),
            "configmap" => Ok(Self::ConfigMap),
            _ => Err(Error::unsupported(token)),
        }
    }

    /// The related resource holding the data, if any
    pub fn data_source(self) -> Option<DataSource> {
        match self {
            Self::String => None,
            Self::Secret => Some(DataSource::Secret),
            Self::ConfigMap => Some(DataSource::ConfigMap),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Secret => write!(f, "Secret"),
            Self::ConfigMap => write!(f, "ConfigMap"),
        }
    }
}

/// Shape of the value at `path`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementType {
    /// A single scalar
    #[default]
    String,
    /// A string-to-string map
    Map,
    /// An array of maps, folded into one map using `sourceKey`/`sourceValue`
    SliceOfMaps,
    /// An array of maps, collecting `sourceValue` of each
    SliceOfStrings,
}

impl ElementType {
    /// Parse an `elementType` token
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "map" => Ok(Self::Map),
            "sliceofmaps" => Ok(Self::SliceOfMaps),
            "sliceofstrings" => Ok(Self::SliceOfStrings),
            _ => Err(Error::unsupported(token)),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Map => write!(f, "map"),
            Self::SliceOfMaps => write!(f, "sliceOfMaps"),
            Self::SliceOfStrings => write!(f, "sliceOfStrings"),
        }
    }
}

/// Parsed form of a key/value binding annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDefinition {
    /// Location of the value (or of the related resource's name)
    pub path: Path,
    /// Where the value lives
    pub object_type: ObjectType,
    /// Shape of the value
    pub element_type: ElementType,
    /// Data key in the related resource, or the key field for `sliceOfMaps`
    pub source_key: String,
    /// Value field for `sliceOfMaps`/`sliceOfStrings`
    pub source_value: String,
    /// Name the produced value is written under
    pub output_name: String,
}

impl BindingDefinition {
    /// Parse an annotation value
    ///
    /// `annotation` is only used for error messages. The output name defaults
    /// to the last segment of the path; see [`Self::with_output_name`].
    pub fn parse(annotation: &str, value: &str) -> Result<Self> {
        let tokens: Vec<&str> = TOKEN_SEPARATOR.split(value).collect();
        if tokens.len() % 2 != 0 {
            return Err(Error::malformed(
                annotation,
                format!("odd number of tokens in {value:?}"),
            ));
        }

        // Later duplicates win; unknown keys are carried along and ignored
        let raw: HashMap<&str, &str> = tokens
            .chunks_exact(2)
            .map(|pair| (pair[0].trim(), pair[1].trim()))
            .collect();

        let path = raw
            .get(PATH_KEY)
            .map(|p| Path::from_annotation(p))
            .ok_or_else(|| Error::malformed(annotation, format!("path not found in {value:?}")))?;

        let object_type = match raw.get(OBJECT_TYPE_KEY) {
            Some(token) => ObjectType::parse(token)?,
            None => ObjectType::String,
        };

        let source_key = raw.get(SOURCE_KEY_KEY).copied().unwrap_or_default().to_string();
        let source_value = raw.get(SOURCE_VALUE_KEY).copied().unwrap_or_default().to_string();

        let element_type = match raw.get(ELEMENT_TYPE_KEY) {
            Some(token) => ElementType::parse(token)?,
            None if object_type.data_source().is_some() && source_key.is_empty() => ElementType::Map,
            None => ElementType::String,
        };

        if element_type == ElementType::SliceOfMaps
            && (source_key.is_empty() || source_value.is_empty())
        {
            return Err(Error::SliceOfMapsMissingKeys {
                annotation: annotation.to_string(),
            });
        }

        let output_name = path
            .last_field()
            .map(|f| f.name.clone())
            .unwrap_or_default();

        Ok(Self {
            path,
            object_type,
            element_type,
            source_key,
            source_value,
            output_name,
        })
    }

    /// Override the output name
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// Select the extraction strategy for this definition
    ///
    /// Slice element types read from the service document whatever the
    /// object type says.
    pub fn extraction(&self) -> Extraction {
        let strategy = match (self.element_type, self.object_type.data_source()) {
            (ElementType::String, None) => Strategy::Scalar,
            (ElementType::String, Some(source)) => Strategy::ScalarFromData {
                source,
                key: self.source_key.clone(),
            },
            (ElementType::Map, None) => Strategy::StringMap,
            (ElementType::Map, Some(source)) => Strategy::MapFromData { source },
            (ElementType::SliceOfMaps, _) => Strategy::SliceOfMaps {
                key: self.source_key.clone(),
                value: self.source_value.clone(),
            },
            (ElementType::SliceOfStrings, _) => Strategy::SliceOfStrings {
                value: self.source_value.clone(),
            },
        };
        Extraction::new(self.path.clone(), strategy)
    }
}
