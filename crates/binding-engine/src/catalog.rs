//! Service descriptor catalog
//!
//! Operator catalogs describe the fields of a custom resource with
//! `x-descriptors`. Descriptors starting with `binding:` are treated as
//! name-only binding annotations, so an operator author can declare bindable
//! fields without annotating every instance.

use std::collections::BTreeMap;

use kube::core::GroupVersionKind;
use serde::Deserialize;
use serde_json::Value as Json;

use binding_common::BINDING_VALUE_PREFIX;

use crate::fetcher::FetchError;

#[cfg(test)]
use mockall::automock;

/// One described field of a custom resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Path below `spec` or `status`
    pub path: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Descriptor tags, e.g. `binding:env:object:secret:user`
    #[serde(default, rename = "x-descriptors")]
    pub x_descriptors: Vec<String>,
}

/// Catalog description of one custom resource kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdDescription {
    /// CRD name, `<plural>.<group>`
    #[serde(default)]
    pub name: String,
    /// Described version
    #[serde(default)]
    pub version: String,
    /// Described kind
    #[serde(default)]
    pub kind: String,
    /// Descriptors of fields under `spec`
    #[serde(default)]
    pub spec_descriptors: Vec<Descriptor>,
    /// Descriptors of fields under `status`
    #[serde(default)]
    pub status_descriptors: Vec<Descriptor>,
}

impl CrdDescription {
    /// Translate binding descriptors into name-only annotations
    ///
    /// Status descriptors are translated before spec descriptors, and a later
    /// translation replaces an earlier one with the same name.
    pub fn binding_annotations(&self, prefix: &str) -> BTreeMap<String, String> {
        let mut anns = BTreeMap::new();
        let roots = [
            ("status", &self.status_descriptors),
            ("spec", &self.spec_descriptors),
        ];
        for (root, descriptors) in roots {
            for descriptor in descriptors {
                for tag in &descriptor.x_descriptors {
                    if let Some((name, value)) = descriptor_annotation(prefix, root, &descriptor.path, tag) {
                        anns.insert(name, value);
                    }
                }
            }
        }
        anns
    }
}

/// Translate one descriptor tag into an annotation name and value
///
/// `binding:env:object:secret:user` becomes `<prefix><root>.<path>-user` with
/// value `binding:env:object:secret`; volume mount tags keep their first
/// three segments.
fn descriptor_annotation(prefix: &str, root: &str, path: &str, tag: &str) -> Option<(String, String)> {
    if !tag.starts_with(BINDING_VALUE_PREFIX) {
        return None;
    }

    let name = format!("{prefix}{root}.{path}");
    let segments: Vec<&str> = tag.split(':').collect();
    match segments.get(1).copied() {
        Some("env") if segments.len() > 4 => {
            Some((format!("{name}-{}", segments[4]), segments[..4].join(":")))
        }
        Some("env") => Some((name, tag.to_string())),
        Some("volumemount") => Some((name, segments[..segments.len().min(3)].join(":"))),
        _ => None,
    }
}

/// Looks up catalog descriptions for resource kinds
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait DescriptorCatalog: Send + Sync {
    /// Find the description of `gvk`, given its CustomResourceDefinition
    ///
    /// `Ok(None)` and not-found errors are both treated as "no descriptors".
    async fn find(
        &self,
        gvk: &GroupVersionKind,
        crd: &Json,
    ) -> Result<Option<CrdDescription>, FetchError>;
}

/// Catalog that never has descriptions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

#[async_trait::async_trait]
impl DescriptorCatalog for NoCatalog {
    async fn find(
        &self,
        _gvk: &GroupVersionKind,
        _crd: &Json,
    ) -> Result<Option<CrdDescription>, FetchError> {
        Ok(None)
    }
}

/// In-memory catalog keyed by group, version and kind
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<(String, String, String), CrdDescription>,
}

impl StaticCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the description of `gvk`
    pub fn with(mut self, gvk: &GroupVersionKind, description: CrdDescription) -> Self {
        self.entries.insert(key(gvk), description);
        self
    }
}

fn key(gvk: &GroupVersionKind) -> (String, String, String) {
    (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone())
}

#[async_trait::async_trait]
impl DescriptorCatalog for StaticCatalog {
    async fn find(
        &self,
        gvk: &GroupVersionKind,
        _crd: &Json,
    ) -> Result<Option<CrdDescription>, FetchError> {
        Ok(self.entries.get(&key(gvk)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PREFIX: &str = "servicebindingoperator.redhat.io/";

    fn description() -> CrdDescription {
        serde_json::from_value(json!({
            "name": "databases.postgresql.baiju.dev",
            "version": "v1alpha1",
            "kind": "Database",
            "statusDescriptors": [
                {
                    "path": "dbCredentials",
                    "displayName": "Database credentials",
                    "x-descriptors": [
                        "urn:alm:descriptor:io.kubernetes:Secret",
                        "binding:env:object:secret:user",
                        "binding:env:object:secret:password"
                    ]
                },
                {"path": "dbConnectionIP", "x-descriptors": ["binding:env:attribute"]}
            ],
            "specDescriptors": [
                {"path": "dbConfigMap", "x-descriptors": ["binding:volumemount:configmap:extra"]}
            ]
        }))
        .expect("description should deserialize")
    }

    #[test]
    fn test_binding_annotations() {
        let anns = description().binding_annotations(PREFIX);
        let expected: BTreeMap<String, String> = [
            (
                "servicebindingoperator.redhat.io/status.dbCredentials-user",
                "binding:env:object:secret",
            ),
            (
                "servicebindingoperator.redhat.io/status.dbCredentials-password",
                "binding:env:object:secret",
            ),
            (
                "servicebindingoperator.redhat.io/status.dbConnectionIP",
                "binding:env:attribute",
            ),
            (
                "servicebindingoperator.redhat.io/spec.dbConfigMap",
                "binding:volumemount:configmap",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(anns, expected);
    }

    #[test]
    fn test_non_binding_descriptors_ignored() {
        assert!(descriptor_annotation(PREFIX, "status", "x", "urn:alm:descriptor:text").is_none());
        assert!(descriptor_annotation(PREFIX, "status", "x", "binding:route:x").is_none());
    }

    #[tokio::test]
    async fn test_static_catalog() {
        let gvk = GroupVersionKind::gvk("postgresql.baiju.dev", "v1alpha1", "Database");
        let catalog = StaticCatalog::new().with(&gvk, description());

        let found = catalog
            .find(&gvk, &json!({}))
            .await
            .expect("lookup should succeed");
        assert_eq!(found.map(|d| d.kind), Some("Database".to_string()));

        let other = GroupVersionKind::gvk("postgresql.baiju.dev", "v1beta1", "Database");
        let found = catalog.find(&other, &json!({})).await.expect("lookup should succeed");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_no_catalog() {
        let gvk = GroupVersionKind::gvk("", "v1", "Service");
        let found = NoCatalog.find(&gvk, &json!({})).await.expect("lookup should succeed");
        assert!(found.is_none());
    }
}
