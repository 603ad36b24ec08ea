//! Service contexts
//!
//! A [`ServiceContext`] is everything one backing service contributes to a
//! binding: its manifest, the values extracted by its binding annotations,
//! and which of those values should be mounted as files.
//!
//! Annotations are collected from three places, each overriding the one
//! before it on identical names:
//! 1. the descriptor catalog entry for the service's kind
//! 2. the annotations of the service's CustomResourceDefinition
//! 3. the annotations of the service instance itself

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, info, trace, Span};

use binding_common::kube_utils::{api_version_of, crd_name};

use crate::annotations::{parse_annotation, BindingType};
use crate::catalog::DescriptorCatalog;
use crate::config::EngineConfig;
use crate::document::{merge, Document, MergeOptions};
use crate::error::Error;
use crate::fetcher::{FetchError, ObjectRef, ResourceFetcher};
use crate::producer::ValueProducer;
use crate::Result;

/// Reference to one backing service of a binding request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackingServiceSelector {
    /// API group; empty for the core group
    #[serde(default)]
    pub group: String,
    /// API version
    pub version: String,
    /// Kind
    pub kind: String,
    /// Name of the service instance
    pub resource_ref: String,
    /// Namespace of the service; defaults to the binding request's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Prefix for this service's variables; the kind is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var_prefix: Option<String>,
    /// Alias for the service in custom environment templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl BackingServiceSelector {
    /// Select `kind` `name` from `group/version`
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        resource_ref: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            resource_ref: resource_ref.into(),
            ..Default::default()
        }
    }

    /// Group, version and kind of the selected service
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }
}

/// What one backing service contributes to a binding
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceContext {
    gvk: GroupVersionKind,
    name: String,
    service: Json,
    env_vars: Document,
    volume_keys: Vec<String>,
    env_var_prefix: Option<String>,
    id: Option<String>,
}

impl ServiceContext {
    /// Create a context from already extracted values
    pub fn new(selector: &BackingServiceSelector, service: Json, env_vars: Document) -> Self {
        Self {
            gvk: selector.gvk(),
            name: selector.resource_ref.clone(),
            service,
            env_vars,
            volume_keys: Vec::new(),
            env_var_prefix: selector.env_var_prefix.clone(),
            id: selector.id.clone(),
        }
    }

    /// Flag output paths for delivery as mounted files
    pub fn with_volume_keys(mut self, volume_keys: Vec<String>) -> Self {
        self.volume_keys = volume_keys;
        self
    }

    /// Group, version and kind of the service
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    /// Name of the service instance
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service manifest as fetched
    pub fn service(&self) -> &Json {
        &self.service
    }

    /// Accumulated values
    pub fn env_vars(&self) -> &Document {
        &self.env_vars
    }

    /// Output paths to deliver as mounted files, in annotation order
    pub fn volume_keys(&self) -> &[String] {
        &self.volume_keys
    }

    /// Prefix requested by the selector
    pub fn env_var_prefix(&self) -> Option<&str> {
        self.env_var_prefix.as_deref()
    }

    /// Alias requested by the selector
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Builds [`ServiceContext`]s for one binding request
pub struct ServiceContextBuilder {
    fetcher: Arc<dyn ResourceFetcher>,
    catalog: Arc<dyn DescriptorCatalog>,
    config: EngineConfig,
    namespace: String,
    producer: ValueProducer,
    span: Span,
}

impl ServiceContextBuilder {
    /// Create a builder for a binding request living in `namespace`
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        catalog: Arc<dyn DescriptorCatalog>,
        config: EngineConfig,
        namespace: impl Into<String>,
        parent: Span,
    ) -> Self {
        let namespace = namespace.into();
        let span = tracing::info_span!(parent: &parent, "service_context", namespace = %namespace);
        let producer = ValueProducer::new(Some(fetcher.clone()), span.clone());
        Self {
            fetcher,
            catalog,
            config,
            namespace,
            producer,
            span,
        }
    }

    /// Build one context per selector, in selector order
    pub async fn build_all(&self, selectors: &[BackingServiceSelector]) -> Result<Vec<ServiceContext>> {
        let mut contexts = Vec::with_capacity(selectors.len());
        for selector in selectors {
            contexts.push(self.build(selector).await?);
        }
        Ok(contexts)
    }

    /// Build the context of one backing service
    ///
    /// A missing CRD or catalog entry only means fewer annotations. Failing
    /// to fetch the service, and any binding annotation that fails to parse
    /// or produce, abort the build.
    pub async fn build(&self, selector: &BackingServiceSelector) -> Result<ServiceContext> {
        let namespace = selector
            .namespace
            .as_deref()
            .unwrap_or(&self.namespace);
        if namespace.is_empty() {
            return Err(Error::InvalidSelector {
                selector: format!("{}/{}", selector.kind, selector.resource_ref),
                reason: "no namespace given and the binding request has none".to_string(),
            });
        }

        let gvk = selector.gvk();
        let target = ObjectRef::new(
            api_version_of(&gvk),
            &selector.kind,
            namespace,
            &selector.resource_ref,
        );
        let service = self
            .fetcher
            .get(&target)
            .await
            .map_err(|source| Error::ServiceLookup {
                target: target.to_string(),
                source,
            })?;

        let annotations = self.collect_annotations(&gvk, &service).await?;

        let mut env_vars = Document::new();
        let mut volume_keys = Vec::new();
        for (name, value) in &annotations {
            let binding = match parse_annotation(name, value, &self.config) {
                Ok(binding) => binding,
                Err(e) if e.is_foreign_annotation() => {
                    trace!(parent: &self.span, annotation = %name, "skipping non-binding annotation");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let produced = self.producer.produce(&binding.extraction, &service).await?;
            merge(
                &mut env_vars,
                binding.placement.place(produced),
                MergeOptions::ACCUMULATE,
            );
            if binding.binding_type == BindingType::VolumeMount {
                volume_keys.push(binding.placement.output_path());
            }
            debug!(
                parent: &self.span,
                annotation = %name,
                binding_type = %binding.binding_type,
                "applied binding annotation"
            );
        }

        info!(
            parent: &self.span,
            service = %target,
            annotations = annotations.len(),
            volume_keys = volume_keys.len(),
            "built service context"
        );

        Ok(ServiceContext::new(selector, service, env_vars).with_volume_keys(volume_keys))
    }

    /// Merge catalog, CRD and instance annotations, later sources winning
    async fn collect_annotations(
        &self,
        gvk: &GroupVersionKind,
        service: &Json,
    ) -> Result<BTreeMap<String, String>> {
        let mut annotations = BTreeMap::new();

        let crd_ref = ObjectRef::crd(crd_name(gvk));
        match self.fetcher.get(&crd_ref).await {
            Ok(crd) => {
                match self.catalog.find(gvk, &crd).await {
                    Ok(Some(description)) => annotations.extend(
                        description.binding_annotations(&self.config.legacy_annotation_prefix),
                    ),
                    Ok(None) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(parent: &self.span, crd = %crd_ref.name, "no catalog description");
                    }
                    Err(source) => return Err(lookup_error(&crd_ref, source)),
                }
                annotations.extend(annotations_of(&crd));
            }
            Err(e) if e.is_not_found() => {
                debug!(parent: &self.span, crd = %crd_ref.name, "resource definition not found");
            }
            Err(source) => return Err(lookup_error(&crd_ref, source)),
        }

        annotations.extend(annotations_of(service));
        Ok(annotations)
    }
}

fn lookup_error(target: &ObjectRef, source: FetchError) -> Error {
    Error::ServiceLookup {
        target: target.to_string(),
        source,
    }
}

/// String annotations of a manifest
fn annotations_of(manifest: &Json) -> BTreeMap<String, String> {
    manifest
        .pointer("/metadata/annotations")
        .and_then(Json::as_object)
        .map(|anns| {
            anns.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CrdDescription, MockDescriptorCatalog, NoCatalog};
    use crate::document::Value;
    use crate::fetcher::MockResourceFetcher;
    use serde_json::json;

    const CRD_NAME: &str = "databases.postgresql.baiju.dev";

    fn selector() -> BackingServiceSelector {
        BackingServiceSelector::new("postgresql.baiju.dev", "v1alpha1", "Database", "db-testing")
    }

    fn database(annotations: Json) -> Json {
        json!({
            "apiVersion": "postgresql.baiju.dev/v1alpha1",
            "kind": "Database",
            "metadata": {
                "name": "db-testing",
                "namespace": "default",
                "annotations": annotations
            },
            "status": {
                "dbCredentials": {"username": "AzureDiamond", "password": "hunter2"},
                "host": "db.svc"
            }
        })
    }

    fn not_found(target: &ObjectRef) -> FetchError {
        FetchError::NotFound {
            kind: target.kind.clone(),
            name: target.name.clone(),
        }
    }

    fn builder(fetcher: MockResourceFetcher, catalog: Arc<dyn DescriptorCatalog>) -> ServiceContextBuilder {
        ServiceContextBuilder::new(
            Arc::new(fetcher),
            catalog,
            EngineConfig::default(),
            "default",
            Span::current(),
        )
    }

    #[tokio::test]
    async fn test_build_from_instance_annotations() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| match target.kind.as_str() {
            "Database" => Ok(database(json!({
                "service.binding/username": "path={.status.dbCredentials.username}",
                "kubectl.kubernetes.io/last-applied-configuration": "{}"
            }))),
            _ => Err(not_found(target)),
        });

        let ctx = builder(fetcher, Arc::new(NoCatalog))
            .build(&selector())
            .await
            .expect("context should build");

        assert_eq!(ctx.name(), "db-testing");
        assert_eq!(ctx.env_vars().len(), 1);
        assert_eq!(ctx.env_vars()["username"], Value::from("AzureDiamond"));
        assert!(ctx.volume_keys().is_empty());
    }

    #[tokio::test]
    async fn test_selector_namespace_wins() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher
            .expect_get()
            .withf(|target| target.kind == "Database")
            .returning(|target| {
                assert_eq!(target.namespace.as_deref(), Some("databases"));
                Ok(database(json!({})))
            });
        fetcher
            .expect_get()
            .withf(|target| target.kind == "CustomResourceDefinition")
            .returning(|target| Err(not_found(target)));

        let mut selector = selector();
        selector.namespace = Some("databases".to_string());
        builder(fetcher, Arc::new(NoCatalog))
            .build(&selector)
            .await
            .expect("context should build");
    }

    #[tokio::test]
    async fn test_empty_namespace_rejected() {
        let fetcher = MockResourceFetcher::new();
        let builder = ServiceContextBuilder::new(
            Arc::new(fetcher),
            Arc::new(NoCatalog),
            EngineConfig::default(),
            "",
            Span::current(),
        );
        let err = builder.build(&selector()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));
    }

    #[tokio::test]
    async fn test_service_fetch_failure_aborts() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| Err(not_found(target)));

        let err = builder(fetcher, Arc::new(NoCatalog))
            .build(&selector())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceLookup { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_precedence_instance_over_crd_over_catalog() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| match target.kind.as_str() {
            "Database" => Ok(database(json!({
                "servicebindingoperator.redhat.io/status.host": "binding:env:attribute"
            }))),
            "CustomResourceDefinition" => {
                assert_eq!(target.name, CRD_NAME);
                Ok(json!({
                    "metadata": {
                        "name": CRD_NAME,
                        "annotations": {
                            "servicebindingoperator.redhat.io/status.host": "binding:volumemount:attribute",
                            "service.binding/user": "path={.status.dbCredentials.username}"
                        }
                    }
                }))
            }
            _ => Err(not_found(target)),
        });

        let mut catalog = MockDescriptorCatalog::new();
        catalog.expect_find().times(1).returning(|_, _| {
            Ok(Some(
                serde_json::from_value::<CrdDescription>(json!({
                    "statusDescriptors": [
                        {"path": "host", "x-descriptors": ["binding:volumemount:attribute"]},
                        {"path": "dbCredentials", "x-descriptors": ["binding:env:attribute"]}
                    ]
                }))
                .expect("description should deserialize"),
            ))
        });

        let ctx = builder(fetcher, Arc::new(catalog))
            .build(&selector())
            .await
            .expect("context should build");

        // status.host was overridden to env by the instance, so nothing is mounted
        assert!(ctx.volume_keys().is_empty());
        let Value::Document(status) = &ctx.env_vars()["status"] else {
            panic!("expected nested status document");
        };
        assert_eq!(status["host"], Value::from("db.svc"));
        assert!(status.contains_key("dbCredentials"));
        assert_eq!(ctx.env_vars()["user"], Value::from("AzureDiamond"));
    }

    #[tokio::test]
    async fn test_crd_transport_error_aborts() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| match target.kind.as_str() {
            "Database" => Ok(database(json!({}))),
            _ => Err(FetchError::Serialization {
                kind: target.kind.clone(),
                message: "connection reset".to_string(),
            }),
        });

        let err = builder(fetcher, Arc::new(NoCatalog))
            .build(&selector())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceLookup { ref target, .. } if target.contains(CRD_NAME)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_catalog_not_found_is_not_fatal() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| match target.kind.as_str() {
            "Database" => Ok(database(json!({
                "service.binding/host": "path={.status.host}"
            }))),
            _ => Ok(json!({"metadata": {"name": CRD_NAME}})),
        });

        let mut catalog = MockDescriptorCatalog::new();
        catalog.expect_find().returning(|gvk, _| {
            Err(FetchError::NotFound {
                kind: "ClusterServiceVersion".to_string(),
                name: gvk.kind.clone(),
            })
        });

        let ctx = builder(fetcher, Arc::new(catalog))
            .build(&selector())
            .await
            .expect("context should build");
        assert_eq!(ctx.env_vars()["host"], Value::from("db.svc"));
    }

    #[tokio::test]
    async fn test_producer_error_aborts() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| match target.kind.as_str() {
            "Database" => Ok(database(json!({
                "service.binding/port": "path={.status.port}"
            }))),
            _ => Err(not_found(target)),
        });

        let err = builder(fetcher, Arc::new(NoCatalog))
            .build(&selector())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));
    }

    #[tokio::test]
    async fn test_build_all_keeps_selector_order() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_get().returning(|target| match target.kind.as_str() {
            "Database" => {
                let mut db = database(json!({}));
                db["metadata"]["name"] = json!(target.name.clone());
                Ok(db)
            }
            _ => Err(not_found(target)),
        });

        let mut second = selector();
        second.resource_ref = "db-replica".to_string();
        second.id = Some("replica".to_string());

        let contexts = builder(fetcher, Arc::new(NoCatalog))
            .build_all(&[selector(), second])
            .await
            .expect("contexts should build");
        let names: Vec<&str> = contexts.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["db-testing", "db-replica"]);
        assert_eq!(contexts[1].id(), Some("replica"));
    }

    #[test]
    fn test_selector_deserializes_camel_case() {
        let selector: BackingServiceSelector = serde_json::from_value(json!({
            "group": "postgresql.baiju.dev",
            "version": "v1alpha1",
            "kind": "Database",
            "resourceRef": "db-testing",
            "envVarPrefix": "DB"
        }))
        .expect("selector should deserialize");
        assert_eq!(selector.resource_ref, "db-testing");
        assert_eq!(selector.env_var_prefix.as_deref(), Some("DB"));
        assert!(selector.namespace.is_none());
    }
}
