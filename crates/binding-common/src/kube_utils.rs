//! Kubernetes helpers shared by the binding engine
//!
//! Everything here is pure: turning apiVersion/kind pairs into `ApiResource`s,
//! guessing resource plurals, and naming resource-type definitions. The only
//! kube-rs type inspected at runtime is `kube::Error`, to tell a missing
//! object apart from a transport failure.

use kube::core::{ApiResource, GroupVersionKind};

/// Kinds whose plural can't be derived with the simple suffix rules below
const KIND_PLURALS: &[(&str, &str)] = &[
    ("endpoints", "endpoints"),
    ("ingress", "ingresses"),
    ("networkpolicy", "networkpolicies"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("storageclass", "storageclasses"),
];

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version you provide is used exactly; no discovery round-trip happens.
///
/// # Example
/// ```ignore
/// let ar = build_api_resource("v1", "Secret");
/// let api: Api<DynamicObject> = Api::namespaced_with(client, "default", &ar);
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Join a GroupVersionKind's group and version into an apiVersion string
///
/// The core group is empty, so `("", "v1")` becomes `v1`.
pub fn api_version_of(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

/// Split an apiVersion into `(group, version)`
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for irregular kinds, falling back to simple
/// pluralization rules for everything else.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Name of the CustomResourceDefinition that defines `gvk`
///
/// CRDs are named `<plural>.<group>`, e.g. `databases.postgresql.baiju.dev`.
/// Core kinds have no CRD; for them the bare plural is returned and the
/// lookup simply comes back not-found.
pub fn crd_name(gvk: &GroupVersionKind) -> String {
    let plural = pluralize_kind(&gvk.kind);
    if gvk.group.is_empty() {
        plural
    } else {
        format!("{}.{}", plural, gvk.group)
    }
}

/// Returns true when the kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}
