//! Final environment composition
//!
//! Two passes write into one output map:
//! 1. every service context is flattened into `PREFIX_KIND_PATH` variables
//! 2. custom templates are rendered against a view of all contexts
//!
//! Contexts are applied in selector order and templates after them, in list
//! order. On a name collision the later write wins, so a custom template
//! always replaces a flattened variable of the same name.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, info, Span};

use crate::config::EngineConfig;
use crate::context::ServiceContext;
use crate::document::{document_to_json, merge, Document, MergeOptions};
use crate::envvars::flatten;
use crate::error::Error;
use crate::template::TemplateEngine;
use crate::Result;

/// A caller-defined variable whose value is a template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEnvVar {
    /// Variable name
    pub name: String,
    /// Template rendered against the composite view
    pub value: String,
}

impl CustomEnvVar {
    /// Create a custom variable
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Everything handed to the component that writes the binding secret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingOutput {
    /// Final variable names and values
    pub env_vars: BTreeMap<String, Vec<u8>>,
    /// Output paths to deliver as mounted files, in context order
    pub volume_keys: Vec<String>,
}

/// Composes service contexts into a [`BindingOutput`]
pub struct EnvComposer {
    env_var_prefix: String,
    engine: TemplateEngine,
    span: Span,
}

impl EnvComposer {
    /// Create a composer; `env_var_prefix` leads every name when non-empty
    pub fn new(env_var_prefix: impl Into<String>, parent: Span) -> Self {
        let span = tracing::debug_span!(parent: &parent, "env_composer");
        Self {
            env_var_prefix: env_var_prefix.into(),
            engine: TemplateEngine::new(),
            span,
        }
    }

    /// Create a composer using the configured global prefix
    pub fn from_config(config: &EngineConfig, parent: Span) -> Self {
        Self::new(config.env_var_prefix.clone(), parent)
    }

    /// Flatten `contexts` and render `custom` into the final output
    pub fn compose(&self, contexts: &[ServiceContext], custom: &[CustomEnvVar]) -> Result<BindingOutput> {
        let mut env_vars: BTreeMap<String, String> = BTreeMap::new();
        let mut volume_keys = Vec::new();

        for ctx in contexts {
            let prefix = self.name_prefix(ctx);
            let flattened = flatten(ctx.env_vars(), &prefix);
            debug!(
                parent: &self.span,
                service = %ctx.name(),
                variables = flattened.len(),
                "flattened service context"
            );
            env_vars.extend(flattened);
            volume_keys.extend(ctx.volume_keys().iter().cloned());
        }

        if !custom.is_empty() {
            let view = minijinja::Value::from_serialize(composite_view(contexts));
            for var in custom {
                let rendered = self
                    .engine
                    .render(&var.value, &view)
                    .map_err(|source| Error::Template {
                        name: var.name.clone(),
                        source,
                    })?;
                env_vars.insert(self.custom_name(&var.name), rendered);
            }
        }

        info!(
            parent: &self.span,
            variables = env_vars.len(),
            volume_keys = volume_keys.len(),
            "composed binding environment"
        );

        Ok(BindingOutput {
            env_vars: env_vars
                .into_iter()
                .map(|(k, v)| (k, v.into_bytes()))
                .collect(),
            volume_keys,
        })
    }

    /// Leading name segments for one context's variables
    ///
    /// The kind stands in for a missing selector prefix; an explicitly empty
    /// prefix adds nothing.
    fn name_prefix(&self, ctx: &ServiceContext) -> Vec<String> {
        let mut prefix = Vec::new();
        if !self.env_var_prefix.is_empty() {
            prefix.push(self.env_var_prefix.clone());
        }
        match ctx.env_var_prefix() {
            Some("") => {}
            Some(p) => prefix.push(p.to_string()),
            None => prefix.push(ctx.gvk().kind.clone()),
        }
        prefix
    }

    fn custom_name(&self, name: &str) -> String {
        if self.env_var_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.env_var_prefix, name)
        }
    }
}

/// The document custom templates are rendered against
///
/// - each manifest at `<version>.<group>.<kind>.<name>`, without the empty core group
/// - each manifest under its alias: the selector id, or else its name
/// - accumulated values of every context, merged, at the root
///
/// Accumulated values are written last, so a root key bound by an annotation
/// shadows a manifest entry of the same name.
pub fn composite_view(contexts: &[ServiceContext]) -> Json {
    let mut view = Json::Object(Map::new());
    for ctx in contexts {
        let gvk = ctx.gvk();
        let mut segments = vec![gvk.version.clone()];
        if !gvk.group.is_empty() {
            segments.push(normalize_key(&gvk.group));
        }
        segments.push(gvk.kind.clone());
        segments.push(normalize_key(ctx.name()));
        insert_at(&mut view, &segments, ctx.service().clone());

        let alias = ctx
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| normalize_key(ctx.name()));
        insert_at(&mut view, &[alias], ctx.service().clone());
    }

    let mut merged = Document::new();
    for ctx in contexts {
        merge(&mut merged, ctx.env_vars().clone(), MergeOptions::ACCUMULATE);
    }
    if let Json::Object(values) = document_to_json(&merged) {
        object_mut(&mut view).extend(values);
    }

    view
}

/// Make a name usable as a template identifier
fn normalize_key(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

/// Set `value` at `segments`, creating or replacing intermediate objects
fn insert_at(root: &mut Json, segments: &[String], value: Json) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        node = object_mut(node)
            .entry(segment.clone())
            .or_insert_with(|| Json::Object(Map::new()));
    }
    object_mut(node).insert(last.clone(), value);
}

fn object_mut(node: &mut Json) -> &mut Map<String, Json> {
    if !node.is_object() {
        *node = Json::Object(Map::new());
    }
    match node {
        Json::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BackingServiceSelector;
    use crate::document::Value;
    use serde_json::json;

    fn context(selector: &BackingServiceSelector, env_vars: Document) -> ServiceContext {
        let service = json!({
            "apiVersion": format!("{}/{}", selector.group, selector.version),
            "kind": selector.kind,
            "metadata": {"name": selector.resource_ref, "namespace": "default"},
            "status": {"host": "db.svc", "port": 5432}
        });
        ServiceContext::new(selector, service, env_vars)
    }

    fn database() -> BackingServiceSelector {
        BackingServiceSelector::new("postgresql.baiju.dev", "v1alpha1", "Database", "db-testing")
    }

    fn creds() -> Document {
        Document::from([(
            "status".to_string(),
            Value::Document(Document::from([(
                "dbCredentials".to_string(),
                Value::Document(Document::from([
                    ("username".to_string(), Value::from("AzureDiamond")),
                    ("password".to_string(), Value::from("hunter2")),
                ])),
            )])),
        )])
    }

    fn output_string(output: &BindingOutput, key: &str) -> String {
        String::from_utf8(output.env_vars[key].clone()).expect("value should be utf-8")
    }

    #[test]
    fn test_kind_prefix_by_default() {
        let composer = EnvComposer::new("", Span::current());
        let output = composer
            .compose(&[context(&database(), creds())], &[])
            .expect("composition should succeed");

        let names: Vec<&str> = output.env_vars.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "DATABASE_STATUS_DBCREDENTIALS_PASSWORD",
                "DATABASE_STATUS_DBCREDENTIALS_USERNAME"
            ]
        );
    }

    #[test]
    fn test_prefix_rules() {
        let mut with_prefix = database();
        with_prefix.env_var_prefix = Some("pg".to_string());
        let mut empty_prefix = database();
        empty_prefix.env_var_prefix = Some(String::new());

        let composer = EnvComposer::new("app", Span::current());

        let output = composer
            .compose(&[context(&with_prefix, creds())], &[])
            .expect("composition should succeed");
        assert!(output.env_vars.contains_key("APP_PG_STATUS_DBCREDENTIALS_USERNAME"));

        let output = composer
            .compose(&[context(&empty_prefix, creds())], &[])
            .expect("composition should succeed");
        assert!(output.env_vars.contains_key("APP_STATUS_DBCREDENTIALS_USERNAME"));

        let output = composer
            .compose(&[context(&database(), creds())], &[])
            .expect("composition should succeed");
        assert!(output.env_vars.contains_key("APP_DATABASE_STATUS_DBCREDENTIALS_USERNAME"));
    }

    #[test]
    fn test_custom_templates() {
        let composer = EnvComposer::new("", Span::current());
        let custom = [
            CustomEnvVar::new(
                "JDBC_HOST",
                "{{ .v1alpha1.postgresql_baiju_dev.Database.db_testing.status.host }}",
            ),
            CustomEnvVar::new("DB_USER", "{{ .status.dbCredentials.username }}"),
            CustomEnvVar::new("DB_PORT", "{{ db-testing.status.port }}"),
        ];
        let output = composer
            .compose(&[context(&database(), creds())], &custom)
            .expect("composition should succeed");

        assert_eq!(output_string(&output, "JDBC_HOST"), "db.svc");
        assert_eq!(output_string(&output, "DB_USER"), "AzureDiamond");
        assert_eq!(output_string(&output, "DB_PORT"), "5432");
    }

    #[test]
    fn test_custom_template_uses_selector_id_and_global_prefix() {
        let mut selector = database();
        selector.id = Some("primary".to_string());
        let composer = EnvComposer::new("APP", Span::current());
        let custom = [CustomEnvVar::new("HOST", "{{ .primary.status.host }}")];
        let output = composer
            .compose(&[context(&selector, Document::new())], &custom)
            .expect("composition should succeed");
        assert_eq!(output_string(&output, "APP_HOST"), "db.svc");
    }

    #[test]
    fn test_custom_template_wins_collision() {
        let composer = EnvComposer::new("", Span::current());
        let custom = [CustomEnvVar::new(
            "DATABASE_STATUS_DBCREDENTIALS_USERNAME",
            "override",
        )];
        let output = composer
            .compose(&[context(&database(), creds())], &custom)
            .expect("composition should succeed");
        assert_eq!(
            output_string(&output, "DATABASE_STATUS_DBCREDENTIALS_USERNAME"),
            "override"
        );
    }

    #[test]
    fn test_undefined_template_reference_fails() {
        let composer = EnvComposer::new("", Span::current());
        let custom = [CustomEnvVar::new("BROKEN", "{{ .status.missing.field }}")];
        let err = composer
            .compose(&[context(&database(), creds())], &custom)
            .unwrap_err();
        assert!(matches!(err, Error::Template { ref name, .. } if name == "BROKEN"));
    }

    #[test]
    fn test_composite_view_core_group_omitted() {
        let selector = BackingServiceSelector::new("", "v1", "Service", "my-svc");
        let view = composite_view(&[context(&selector, Document::new())]);
        assert_eq!(view["v1"]["Service"]["my_svc"]["kind"], json!("Service"));
        assert_eq!(view["my_svc"]["metadata"]["name"], json!("my-svc"));
    }

    #[test]
    fn test_accumulated_value_shadows_alias() {
        let selector = BackingServiceSelector::new("", "v1", "Service", "host");
        let env_vars = Document::from([("host".to_string(), Value::from("db.svc"))]);
        let custom = [
            CustomEnvVar::new("HOST", "{{ .host }}"),
            CustomEnvVar::new("KIND", "{{ .v1.Service.host.kind }}"),
        ];
        let output = EnvComposer::new("", Span::current())
            .compose(&[context(&selector, env_vars)], &custom)
            .expect("composition should succeed");
        assert_eq!(output_string(&output, "HOST"), "db.svc");
        assert_eq!(output_string(&output, "KIND"), "Service");
    }

    #[test]
    fn test_volume_keys_collected_in_order() {
        let first = context(&database(), Document::new())
            .with_volume_keys(vec!["spec.dbConfigMap".to_string()]);
        let second = context(&database(), Document::new())
            .with_volume_keys(vec!["status.tls".to_string()]);
        let output = EnvComposer::new("", Span::current())
            .compose(&[first, second], &[])
            .expect("composition should succeed");
        assert_eq!(output.volume_keys, vec!["spec.dbConfigMap", "status.tls"]);
    }
}
