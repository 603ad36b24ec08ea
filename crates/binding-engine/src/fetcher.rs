//! Resource fetching
//!
//! The engine reads three kinds of objects from the cluster: the backing
//! service instance, its CustomResourceDefinition, and Secrets/ConfigMaps the
//! service points at. All of them go through [`ResourceFetcher`], so tests can
//! swap the API server for a map of fixtures.

use std::fmt;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::Resource;
use kube::api::{Api, DynamicObject};
use kube::Client;
use serde_json::Value as Json;
use thiserror::Error;

use binding_common::kube_utils::{build_api_resource, is_not_found};
use binding_common::{CRD_API_VERSION, CRD_KIND};

#[cfg(test)]
use mockall::automock;

/// Errors returned by a [`ResourceFetcher`]
#[derive(Debug, Error)]
pub enum FetchError {
    /// The object doesn't exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// The API server couldn't be reached or rejected the request
    #[error("kubernetes error: {source}")]
    Kube {
        /// Underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The object came back in a form that couldn't be converted to JSON
    #[error("failed to serialize {kind}: {message}")]
    Serialization {
        /// Kind of the object
        kind: String,
        /// Serializer message
        message: String,
    },
}

impl FetchError {
    /// Returns true when the requested object doesn't exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube { source } => is_not_found(source),
            Self::Serialization { .. } => false,
        }
    }
}

/// Coordinates of one object to fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// `group/version`, or bare `version` for the core group
    pub api_version: String,
    /// Object kind
    pub kind: String,
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectRef {
    /// Reference a namespaced object
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Reference a Secret
    pub fn secret(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Secret::API_VERSION, Secret::KIND, namespace, name)
    }

    /// Reference a ConfigMap
    pub fn config_map(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ConfigMap::API_VERSION, ConfigMap::KIND, namespace, name)
    }

    /// Reference a cluster-scoped CustomResourceDefinition
    pub fn crd(name: impl Into<String>) -> Self {
        Self {
            api_version: CRD_API_VERSION.to_string(),
            kind: CRD_KIND.to_string(),
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Reads objects from the cluster as JSON documents
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch one object
    ///
    /// A missing object must be reported as [`FetchError::NotFound`] (or a
    /// 404 `kube::Error`) so callers can tell it apart from transport failures.
    async fn get(&self, target: &ObjectRef) -> Result<Json, FetchError>;
}

/// [`ResourceFetcher`] backed by the Kubernetes API
///
/// Uses `DynamicObject` so any kind can be fetched without compiled-in types.
#[derive(Clone)]
pub struct KubeResourceFetcher {
    client: Client,
}

impl KubeResourceFetcher {
    /// Create a fetcher wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for KubeResourceFetcher {
    async fn get(&self, target: &ObjectRef) -> Result<Json, FetchError> {
        let ar = build_api_resource(&target.api_version, &target.kind);
        let api: Api<DynamicObject> = match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let obj = match api.get(&target.name).await {
            Ok(obj) => obj,
            Err(e) if is_not_found(&e) => {
                return Err(FetchError::NotFound {
                    kind: target.kind.clone(),
                    name: target.name.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::to_value(&obj).map_err(|e| FetchError::Serialization {
            kind: target.kind.clone(),
            message: e.to_string(),
        })
    }
}
