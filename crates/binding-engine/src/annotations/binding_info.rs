//! Name-only binding grammar
//!
//! The annotation name carries the paths and the value only says how to bind:
//!
//! ```text
//! servicebindingoperator.redhat.io/status.dbCredentials-password: binding:env:object:secret
//! ```
//!
//! Here `status.dbCredentials` names a Secret and `password` is the key to
//! read from it. Without a `-<sourcePath>` suffix the field path is used for
//! both.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::Result;

/// `binding:<bindingType>:<handler>`
static BINDING_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^binding:(.*?):(.*)$").expect("binding value pattern is valid"));

/// How a produced value is delivered to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingType {
    /// Environment variable
    #[default]
    Env,
    /// File in a mounted volume
    VolumeMount,
}

impl BindingType {
    /// Parse a binding type tag
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "env" => Ok(Self::Env),
            "volumemount" => Ok(Self::VolumeMount),
            _ => Err(Error::UnknownBindingType {
                binding_type: tag.to_string(),
            }),
        }
    }
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env => write!(f, "env"),
            Self::VolumeMount => write!(f, "volumemount"),
        }
    }
}

/// The pieces of a name-only annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    /// Field in the service document: the value itself, or a related resource's name
    pub field_path: String,
    /// Field collected from the service or the related resource
    pub source_path: String,
    /// Annotation value joined with whichever path applies
    pub descriptor: String,
    /// Annotation value as written
    pub value: String,
}

impl BindingInfo {
    /// Split an annotation name into its paths
    ///
    /// Fails with `InvalidAnnotationPrefix` when `name` doesn't start with
    /// `prefix` and with `InvalidAnnotationName` when what follows it isn't
    /// one or two non-empty dash-separated parts.
    pub fn parse(name: &str, value: &str, prefix: &str) -> Result<Self> {
        let rest = name
            .strip_prefix(prefix)
            .ok_or_else(|| Error::InvalidAnnotationPrefix {
                name: name.to_string(),
            })?;

        let invalid = || Error::InvalidAnnotationName {
            name: name.to_string(),
        };

        let (field_path, source_path) = match rest.split_once('-') {
            Some((field, source)) => (field, source),
            None => (rest, rest),
        };
        if field_path.is_empty() || source_path.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            field_path: field_path.to_string(),
            source_path: source_path.to_string(),
            descriptor: format!("{value}:{source_path}"),
            value: value.to_string(),
        })
    }

    /// Returns true when the name carried a separate source path
    pub fn has_source_path(&self) -> bool {
        self.field_path != self.source_path
    }

    /// Split the value into its binding type and handler
    pub fn binding_value(&self, annotation: &str) -> Result<(BindingType, String)> {
        parse_binding_value(annotation, &self.value)
    }
}

/// Split `binding:<type>:<handler>` into its binding type and handler
pub fn parse_binding_value(annotation: &str, value: &str) -> Result<(BindingType, String)> {
    let caps = BINDING_VALUE.captures(value).ok_or_else(|| {
        Error::malformed(
            annotation,
            format!("expected binding:<type>:<handler>, got {value:?}"),
        )
    })?;
    let binding_type = BindingType::parse(&caps[1])?;
    Ok((binding_type, caps[2].to_string()))
}
