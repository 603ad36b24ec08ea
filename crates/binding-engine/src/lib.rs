//! Binding engine: turns annotations on backing services into binding values
//!
//! The pipeline for one binding request:
//! - [`ServiceContextBuilder`] fetches each selected service, gathers its
//!   binding annotations and extracts their values into a [`ServiceContext`]
//! - [`EnvComposer`] flattens all contexts into variable names and renders
//!   custom templates into a single [`BindingOutput`]
//!
//! Cluster access goes through the [`ResourceFetcher`] and
//! [`DescriptorCatalog`] traits so the engine runs against any source.

#![deny(missing_docs)]

pub mod annotations;
pub mod catalog;
pub mod composer;
pub mod config;
pub mod context;
pub mod document;
pub mod envvars;
pub mod error;
pub mod fetcher;
pub mod path;
pub mod producer;
pub mod template;

pub use annotations::{parse_annotation, AnnotationBinding, BindingDefinition, BindingType};
pub use catalog::{CrdDescription, Descriptor, DescriptorCatalog, NoCatalog, StaticCatalog};
pub use composer::{BindingOutput, CustomEnvVar, EnvComposer};
pub use config::{EngineConfig, EnvSource, OsEnvSource};
pub use context::{BackingServiceSelector, ServiceContext, ServiceContextBuilder};
pub use document::{merge, Document, MergeOptions, Value};
pub use error::Error;
pub use fetcher::{FetchError, KubeResourceFetcher, ObjectRef, ResourceFetcher};
pub use path::{Field, Path};
pub use producer::{Extraction, Strategy, ValueProducer};

/// Result type alias using the engine's Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
