//! Feature flags and per-environment configuration.
//!
//! Callers consult these to pick between pipeline variants at runtime; the
//! chain engine itself never reads them.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A flag's unscoped default plus per-scope overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Value used when no scoped entry matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Values keyed by scope (typically an environment name).
    #[serde(default)]
    pub scoped: HashMap<String, Value>,
}

impl FeatureFlag {
    /// Returns the value for `scope`, falling back to the default.
    #[must_use]
    pub fn value_for(&self, scope: Option<&str>) -> Option<&Value> {
        scope
            .and_then(|scope| self.scoped.get(scope))
            .or(self.default.as_ref())
    }
}

/// JSON truthiness: `false`, `null`, `0`, `""` and empty collections are false.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Store of feature flags and opaque per-environment config values.
#[derive(Debug, Default)]
pub struct FlagStore {
    flags: RwLock<HashMap<String, FeatureFlag>>,
    environments: RwLock<HashMap<String, Value>>,
}

impl FlagStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a flag value, for `scope` or (with `None`) as the default.
    pub fn set_feature_flag(&self, name: impl Into<String>, value: impl Into<Value>, scope: Option<&str>) {
        let name = name.into();
        let value = value.into();
        tracing::debug!(flag = %name, scope = scope.unwrap_or("*"), %value, "feature flag set");

        let mut flags = self.flags.write();
        let flag = flags.entry(name).or_default();
        match scope {
            Some(scope) => {
                flag.scoped.insert(scope.to_string(), value);
            }
            None => flag.default = Some(value),
        }
    }

    /// Returns the raw flag value for `scope`, falling back to the default.
    #[must_use]
    pub fn feature_value(&self, name: &str, scope: Option<&str>) -> Option<Value> {
        self.flags.read().get(name)?.value_for(scope).cloned()
    }

    /// Returns true if the flag's value for `scope` is truthy.
    ///
    /// Unknown flags are disabled.
    #[must_use]
    pub fn is_feature_enabled(&self, name: &str, scope: Option<&str>) -> bool {
        self.feature_value(name, scope).is_some_and(|value| is_truthy(&value))
    }

    /// Returns a copy of a flag's full definition.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<FeatureFlag> {
        self.flags.read().get(name).cloned()
    }

    /// Returns the known flag names, sorted.
    #[must_use]
    pub fn flag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flags.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stores the config value for `env`, replacing any previous one.
    pub fn set_environment_config(&self, env: impl Into<String>, config: Value) {
        let env = env.into();
        tracing::debug!(environment = %env, "environment config set");
        self.environments.write().insert(env, config);
    }

    /// Returns the config value stored for `env`.
    #[must_use]
    pub fn get_environment_config(&self, env: &str) -> Option<Value> {
        self.environments.read().get(env).cloned()
    }

    /// Deserializes the config stored for `env` into `T`.
    ///
    /// Returns `Ok(None)` when nothing is stored.
    pub fn get_environment_config_as<T: DeserializeOwned>(
        &self,
        env: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        self.get_environment_config(env)
            .map(serde_json::from_value)
            .transpose()
    }

    /// Returns the environments with stored config, sorted.
    #[must_use]
    pub fn environment_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.environments.read().keys().cloned().collect();
        names.sort();
        names
    }
}
