//! Error types for the binding engine
//!
//! Variants carry the annotation, path or resource that caused them so a
//! failed reconcile can be diagnosed from its status message alone.

use thiserror::Error;

use crate::fetcher::FetchError;
use crate::template::TemplateError;

/// Main error type for binding engine operations
#[derive(Debug, Error)]
pub enum Error {
    /// Annotation name doesn't carry a binding prefix; callers skip it
    #[error("invalid annotation prefix: {name}")]
    InvalidAnnotationPrefix {
        /// Full annotation name
        name: String,
    },

    /// Annotation name carries a binding prefix but no usable field path
    #[error("invalid annotation name: {name}")]
    InvalidAnnotationName {
        /// Full annotation name
        name: String,
    },

    /// Annotation value doesn't follow the binding grammar
    #[error("malformed binding annotation {annotation:?}: {message}")]
    MalformedGrammar {
        /// Annotation name the value belongs to
        annotation: String,
        /// Description of what's malformed
        message: String,
    },

    /// `elementType=sliceOfMaps` without both `sourceKey` and `sourceValue`
    #[error("sliceOfMaps elementType requires sourceKey and sourceValue to be present (annotation {annotation:?})")]
    SliceOfMapsMissingKeys {
        /// Annotation name the value belongs to
        annotation: String,
    },

    /// Nothing exists at the requested path
    #[error("path not found: {path}")]
    PathNotFound {
        /// Dotted path that was looked up
        path: String,
    },

    /// Something exists at the path, but not with the expected shape
    #[error("invalid argument value for path {path:?}: expected {expected}")]
    InvalidArgumentType {
        /// Dotted path that was looked up
        path: String,
        /// The shape the strategy needed (e.g. "string", "array of maps")
        expected: String,
    },

    /// The field naming a related Secret/ConfigMap is absent
    #[error("secondary resource name field not found at {path}")]
    SecondaryResourceNameFieldNotFound {
        /// Dotted path expected to hold the resource name
        path: String,
    },

    /// Unknown `objectType`/`elementType` token or annotation handler
    #[error("unsupported value type: {value}")]
    UnsupportedValueType {
        /// The offending token
        value: String,
    },

    /// `binding:<type>:...` named a type other than `env` or `volumemount`
    #[error("unknown binding type: {binding_type}")]
    UnknownBindingType {
        /// The offending binding type
        binding_type: String,
    },

    /// Fetching the Secret/ConfigMap referenced by the service failed
    #[error("failed to fetch {kind} {namespace}/{name}: {source}")]
    SecondaryResourceFetchFailed {
        /// Kind of the related resource
        kind: String,
        /// Namespace of the related resource
        namespace: String,
        /// Name of the related resource
        name: String,
        /// The unmodified fetch error
        #[source]
        source: FetchError,
    },

    /// A Secret value isn't valid base64, or doesn't decode to text
    #[error("failed to decode {key:?}: {reason}")]
    DecodingFailed {
        /// Data key whose value failed to decode
        key: String,
        /// What the decoder rejected
        reason: String,
    },

    /// A related-resource strategy was evaluated without a fetcher
    #[error("a resource fetcher is required to resolve {kind} references")]
    MissingClient {
        /// Kind of the related resource that couldn't be fetched
        kind: String,
    },

    /// Fetching the backing service or its resource-type definition failed
    #[error("service lookup failed for {target}: {source}")]
    ServiceLookup {
        /// Human readable reference to the looked up object
        target: String,
        /// The unmodified fetch error
        #[source]
        source: FetchError,
    },

    /// A backing service selector can't be resolved to an object
    #[error("invalid backing service selector {selector}: {reason}")]
    InvalidSelector {
        /// `kind/name` of the selector
        selector: String,
        /// What's wrong with it
        reason: String,
    },

    /// A custom environment variable template failed to render
    #[error("custom environment variable {name:?}: {source}")]
    Template {
        /// Environment variable name the template belongs to
        name: String,
        /// Underlying template error
        #[source]
        source: TemplateError,
    },
}

impl Error {
    /// Create a malformed grammar error
    pub fn malformed(annotation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedGrammar {
            annotation: annotation.into(),
            message: msg.into(),
        }
    }

    /// Create a path-not-found error
    pub fn path_not_found(path: impl ToString) -> Self {
        Self::PathNotFound {
            path: path.to_string(),
        }
    }

    /// Create an invalid argument type error
    pub fn invalid_type(path: impl ToString, expected: impl Into<String>) -> Self {
        Self::InvalidArgumentType {
            path: path.to_string(),
            expected: expected.into(),
        }
    }

    /// Create an unsupported value type error
    pub fn unsupported(value: impl Into<String>) -> Self {
        Self::UnsupportedValueType {
            value: value.into(),
        }
    }

    /// Returns true when a fetch underneath this error came back not-found
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::SecondaryResourceFetchFailed { source, .. }
            | Self::ServiceLookup { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for annotations that simply aren't binding annotations
    pub fn is_foreign_annotation(&self) -> bool {
        matches!(self, Self::InvalidAnnotationPrefix { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = Error::malformed("service.binding/username", "path not found");
        let msg = err.to_string();
        assert!(msg.contains("service.binding/username"));
        assert!(msg.contains("path not found"));

        let err = Error::invalid_type("status.bootstrap", "array");
        assert!(err.to_string().contains("status.bootstrap"));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_is_not_found() {
        let err = Error::ServiceLookup {
            target: "CustomResourceDefinition databases.example.com".to_string(),
            source: FetchError::NotFound {
                kind: "CustomResourceDefinition".to_string(),
                name: "databases.example.com".to_string(),
            },
        };
        assert!(err.is_not_found());
        assert!(!Error::path_not_found("status").is_not_found());
    }

    #[test]
    fn test_foreign_annotation() {
        let err = Error::InvalidAnnotationPrefix {
            name: "kubectl.kubernetes.io/last-applied-configuration".to_string(),
        };
        assert!(err.is_foreign_annotation());
        assert!(!Error::unsupported("foobar").is_foreign_annotation());
    }
}
