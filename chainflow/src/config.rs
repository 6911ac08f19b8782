//! Engine configuration.
//!
//! An [`EngineConfig`] seeds an [`Engine`](crate::engine::Engine) with
//! pipeline descriptors, feature flags and per-environment values. It is
//! plain serde data, usually loaded from a JSON file:
//!
//! ```json
//! {
//!   "environment": "staging",
//!   "default_error_handling": "stop",
//!   "pipelines": [
//!     {"name": "orders", "steps": [{"type": "component", "name": "validate"}]}
//!   ],
//!   "feature_flags": [
//!     {"name": "new-checkout", "value": true, "scope": "staging"}
//!   ],
//!   "environments": {"staging": {"db": "postgres://staging"}}
//! }
//! ```

use crate::chain::ErrorPolicy;
use crate::errors::ConfigError;
use crate::registry::PipelineDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Environment variable consulted when the config names no environment.
pub const ENVIRONMENT_VAR: &str = "CHAINFLOW_ENV";

/// One feature flag assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSetting {
    /// Flag name.
    pub name: String,
    /// Flag value.
    pub value: Value,
    /// Scope the value applies to; the unscoped default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Active environment name.
    pub environment: Option<String>,
    /// Policy for descriptors that do not set `error_handling`.
    #[serde(alias = "defaultErrorHandling")]
    pub default_error_handling: ErrorPolicy,
    /// Pipelines to configure.
    pub pipelines: Vec<PipelineDescriptor>,
    /// Feature flags to set, in order.
    #[serde(alias = "featureFlags")]
    pub feature_flags: Vec<FlagSetting>,
    /// Opaque config values keyed by environment.
    pub environments: Map<String, Value>,
}

impl EngineConfig {
    /// Creates an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Sets the active environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the default error policy.
    #[must_use]
    pub fn with_default_error_handling(mut self, policy: ErrorPolicy) -> Self {
        self.default_error_handling = policy;
        self
    }

    /// Adds a pipeline descriptor.
    #[must_use]
    pub fn with_pipeline(mut self, descriptor: PipelineDescriptor) -> Self {
        self.pipelines.push(descriptor);
        self
    }

    /// Adds a feature flag assignment.
    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<Value>, scope: Option<&str>) -> Self {
        self.feature_flags.push(FlagSetting {
            name: name.into(),
            value: value.into(),
            scope: scope.map(str::to_string),
        });
        self
    }

    /// Adds an environment config value.
    #[must_use]
    pub fn with_environment_config(mut self, env: impl Into<String>, value: Value) -> Self {
        self.environments.insert(env.into(), value);
        self
    }

    /// Returns the active environment: the configured one, else the value
    /// of `CHAINFLOW_ENV`.
    #[must_use]
    pub fn resolve_environment(&self) -> Option<String> {
        self.environment
            .clone()
            .or_else(|| std::env::var(ENVIRONMENT_VAR).ok())
            .filter(|env| !env.trim().is_empty())
    }
}
