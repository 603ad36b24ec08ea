//! Engine configuration
//!
//! Annotation prefixes and the global variable prefix are fixed for most
//! deployments but can be overridden from the operator's environment. The
//! environment is read through [`EnvSource`] so tests never touch process state.

use serde::Deserialize;

use binding_common::{LEGACY_ANNOTATION_PREFIX, SPEC_ANNOTATION_PREFIX};

/// Overrides [`EngineConfig::spec_annotation_prefix`]
pub const SPEC_PREFIX_ENV: &str = "BINDING_SPEC_ANNOTATION_PREFIX";
/// Overrides [`EngineConfig::legacy_annotation_prefix`]
pub const LEGACY_PREFIX_ENV: &str = "BINDING_LEGACY_ANNOTATION_PREFIX";
/// Overrides [`EngineConfig::env_var_prefix`]
pub const ENV_VAR_PREFIX_ENV: &str = "BINDING_ENV_VAR_PREFIX";

/// Trait for reading environment variables
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Value of the variable, `None` when unset
    fn var(&self, name: &str) -> Option<String>;
}

/// Default implementation that reads the process environment
#[derive(Clone, Default)]
pub struct OsEnvSource;

impl EnvSource for OsEnvSource {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Settings shared by every component of the engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Name prefix of key/value grammar annotations
    pub spec_annotation_prefix: String,
    /// Name prefix of name-only grammar annotations and catalog-derived ones
    pub legacy_annotation_prefix: String,
    /// Prefix prepended to every produced variable name; empty for none
    pub env_var_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spec_annotation_prefix: SPEC_ANNOTATION_PREFIX.to_string(),
            legacy_annotation_prefix: LEGACY_ANNOTATION_PREFIX.to_string(),
            env_var_prefix: String::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any `BINDING_*` variables that are set
    ///
    /// Empty prefixes are ignored for the annotation prefixes, since an empty
    /// prefix would turn every annotation into a binding annotation.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = Self::default();
        if let Some(prefix) = env.var(SPEC_PREFIX_ENV).filter(|p| !p.is_empty()) {
            config.spec_annotation_prefix = prefix;
        }
        if let Some(prefix) = env.var(LEGACY_PREFIX_ENV).filter(|p| !p.is_empty()) {
            config.legacy_annotation_prefix = prefix;
        }
        if let Some(prefix) = env.var(ENV_VAR_PREFIX_ENV) {
            config.env_var_prefix = prefix;
        }
        config
    }

    /// Set the global variable prefix
    pub fn with_env_var_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_var_prefix = prefix.into();
        self
    }
}
