//! Common building blocks for the service binding operator: well-known
//! annotation prefixes and API coordinates, kube-rs helpers, and logging setup.

#![deny(missing_docs)]

pub mod kube_utils;
pub mod telemetry;

/// Annotation name prefix for the key/value binding grammar
/// (`service.binding/<name>: path={.status.host}`)
pub const SPEC_ANNOTATION_PREFIX: &str = "service.binding";

/// Annotation name prefix for the name-only binding grammar
/// (`servicebindingoperator.redhat.io/status.host: binding:env:attribute`)
pub const LEGACY_ANNOTATION_PREFIX: &str = "servicebindingoperator.redhat.io/";

/// Prefix every binding-type tag in a name-only annotation value starts with
pub const BINDING_VALUE_PREFIX: &str = "binding:";

/// API version of the resource-type definitions consulted for annotations
pub const CRD_API_VERSION: &str = "apiextensions.k8s.io/v1";

/// Kind of the resource-type definitions consulted for annotations
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// Section of a Secret or ConfigMap holding user data
pub const DATA_FIELD: &str = "data";
