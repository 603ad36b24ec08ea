//! Binding annotations
//!
//! Two annotation grammars select values from a backing service:
//!
//! - key/value, under the `service.binding` prefix:
//!   `service.binding/username: path={.status.dbCredentials.username}`
//! - name-only, under `servicebindingoperator.redhat.io/`:
//!   `servicebindingoperator.redhat.io/status.dbCredentials-password: binding:env:object:secret`
//!
//! [`parse_annotation`] turns either into an [`AnnotationBinding`]: what to
//! extract, how to deliver it, and where to place it in the service's
//! accumulated values.

mod binding_info;
mod definition;

pub use binding_info::{parse_binding_value, BindingInfo, BindingType};
pub use definition::{BindingDefinition, ElementType, ObjectType};

use crate::config::EngineConfig;
use crate::document::{Document, Value};
use crate::error::Error;
use crate::path::Path;
use crate::producer::{DataSource, Extraction, Strategy};
use crate::Result;

/// Where a produced value lands in the service's accumulated document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Under a single top-level key
    Key(String),
    /// Maps are spread into the document; anything else goes under the key
    SpreadOrKey(String),
    /// Nested at the cleaned segments of a path
    Nested(Path),
}

impl Placement {
    /// Wrap `value` into the document fragment this placement describes
    pub fn place(&self, value: Value) -> Document {
        match self {
            Self::Key(key) => Document::from([(key.clone(), value)]),
            Self::SpreadOrKey(key) => {
                if value.is_map() {
                    value.into_document().unwrap_or_default()
                } else {
                    Document::from([(key.clone(), value)])
                }
            }
            Self::Nested(path) => path.compose(value),
        }
    }

    /// Output path reported for volume-mounted values
    pub fn output_path(&self) -> String {
        match self {
            Self::Key(key) | Self::SpreadOrKey(key) => key.clone(),
            Self::Nested(path) => path.to_string(),
        }
    }
}

/// A fully parsed binding annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationBinding {
    /// Annotation name the binding came from
    pub annotation: String,
    /// What to read from the service
    pub extraction: Extraction,
    /// How the value is delivered
    pub binding_type: BindingType,
    /// Where the value goes
    pub placement: Placement,
}

/// Parse one annotation into a binding
///
/// Names under neither binding prefix fail with `InvalidAnnotationPrefix`,
/// which callers are expected to skip.
pub fn parse_annotation(name: &str, value: &str, config: &EngineConfig) -> Result<AnnotationBinding> {
    let spec_prefix = config.spec_annotation_prefix.as_str();
    if let Some(rest) = name.strip_prefix(spec_prefix) {
        if rest.is_empty() {
            return parse_key_value(name, None, value);
        }
        if let Some(key) = rest.strip_prefix('/') {
            return parse_key_value(name, Some(key), value);
        }
    }

    if name.starts_with(&config.legacy_annotation_prefix) {
        return parse_name_only(name, value, &config.legacy_annotation_prefix);
    }

    Err(Error::InvalidAnnotationPrefix {
        name: name.to_string(),
    })
}

fn parse_key_value(name: &str, key: Option<&str>, value: &str) -> Result<AnnotationBinding> {
    let definition = BindingDefinition::parse(name, value)?;
    let explicit = key
        .and_then(|k| k.rsplit('.').next())
        .filter(|k| !k.is_empty());

    let (definition, placement) = match explicit {
        Some(output) => {
            let definition = definition.with_output_name(output);
            let placement = Placement::Key(definition.output_name.clone());
            (definition, placement)
        }
        None => {
            let placement = Placement::SpreadOrKey(definition.output_name.clone());
            (definition, placement)
        }
    };

    Ok(AnnotationBinding {
        annotation: name.to_string(),
        extraction: definition.extraction(),
        binding_type: BindingType::Env,
        placement,
    })
}

fn parse_name_only(name: &str, value: &str, prefix: &str) -> Result<AnnotationBinding> {
    let info = BindingInfo::parse(name, value, prefix)?;
    let (binding_type, handler) = info.binding_value(name)?;
    let field_path = Path::new(&info.field_path);

    let (strategy, output) = match handler.to_ascii_lowercase().as_str() {
        "attribute" => {
            let output = if info.has_source_path() {
                Path::new(&info.source_path)
            } else {
                field_path.clone()
            };
            (Strategy::Subtree, output)
        }
        "object:secret" | "secret" => related_strategy(DataSource::Secret, &info),
        "object:configmap" | "configmap" => related_strategy(DataSource::ConfigMap, &info),
        _ => return Err(Error::unsupported(handler)),
    };

    Ok(AnnotationBinding {
        annotation: name.to_string(),
        extraction: Extraction::new(field_path, strategy),
        binding_type,
        placement: Placement::Nested(output),
    })
}

/// Whole data section, or the single `sourcePath` key, nested under the field path
fn related_strategy(source: DataSource, info: &BindingInfo) -> (Strategy, Path) {
    let field_path = Path::new(&info.field_path);
    if info.has_source_path() {
        let strategy = Strategy::ScalarFromData {
            source,
            key: info.source_path.clone(),
        };
        (strategy, field_path.join(info.source_path.as_str()))
    } else {
        (Strategy::MapFromData { source }, field_path)
    }
}
