//! Error types for the chainflow engine.
//!
//! Failures raised *inside* a chain never surface here: the chain captures
//! them into the context as a [`ContextError`](crate::context::ContextError).
//! The types below cover programmer and configuration mistakes that the
//! registries report eagerly so they fail fast during development.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for chainflow operations.
#[derive(Debug, Error)]
pub enum ChainflowError {
    /// A descriptor referenced an unregistered component, link or middleware.
    #[error("{0}")]
    ComponentNotFound(#[from] ComponentNotFoundError),

    /// No descriptor is registered under the requested pipeline name.
    #[error("{0}")]
    PipelineNotFound(#[from] PipelineNotFoundError),

    /// A pipeline descriptor failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Engine configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ChainflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// The kind of registry entry a descriptor step resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A parametrized link factory.
    Component,
    /// A named, ready-made link.
    Link,
    /// A named middleware.
    Middleware,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component => write!(f, "component"),
            Self::Link => write!(f, "link"),
            Self::Middleware => write!(f, "middleware"),
        }
    }
}

/// Raised when a registry lookup misses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} not found: '{name}'{}", .pipeline.as_ref().map(|p| format!(" (pipeline '{p}')")).unwrap_or_default())]
pub struct ComponentNotFoundError {
    /// The unresolved name.
    pub name: String,
    /// What kind of entry was looked up.
    pub kind: EntryKind,
    /// The pipeline whose build triggered the lookup, if any.
    pub pipeline: Option<String>,
}

impl ComponentNotFoundError {
    /// Creates an error for a missing component factory.
    #[must_use]
    pub fn component(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Component)
    }

    /// Creates an error for a missing named link.
    #[must_use]
    pub fn link(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Link)
    }

    /// Creates an error for a missing named middleware.
    #[must_use]
    pub fn middleware(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Middleware)
    }

    fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pipeline: None,
        }
    }

    /// Records the pipeline being built when the lookup failed.
    #[must_use]
    pub fn in_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }
}

/// Raised when executing or building a pipeline that was never configured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Pipeline not found: '{name}'")]
pub struct PipelineNotFoundError {
    /// The requested pipeline name.
    pub name: String,
}

impl PipelineNotFoundError {
    /// Creates a new pipeline-not-found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "PIPELINE-NAME-BLANK").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline descriptor is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The pipeline involved, when known.
    pub pipeline: Option<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pipeline: None,
            error_info: None,
        }
    }

    /// Sets the pipeline involved.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Errors raised while loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config document is not valid.
    #[error("Invalid config{}: {message}", .path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    Parse {
        /// The file path, when loaded from disk.
        path: Option<PathBuf>,
        /// The parser message.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_not_found_display() {
        let err = ComponentNotFoundError::component("inc");
        assert_eq!(err.to_string(), "component not found: 'inc'");

        let err = ComponentNotFoundError::middleware("audit").in_pipeline("orders");
        assert_eq!(
            err.to_string(),
            "middleware not found: 'audit' (pipeline 'orders')"
        );
    }

    #[test]
    fn test_pipeline_not_found_converts() {
        let err: ChainflowError = PipelineNotFoundError::new("missing").into();
        assert!(matches!(err, ChainflowError::PipelineNotFound(_)));
        assert_eq!(err.to_string(), "Pipeline not found: 'missing'");
    }

    #[test]
    fn test_validation_error_info() {
        let err = PipelineValidationError::new("Pipeline name cannot be blank")
            .with_error_info(
                ErrorInfo::new("PIPELINE-NAME-BLANK", "Blank pipeline name")
                    .with_fix_hint("Give the pipeline a name"),
            );

        let info = err.error_info.unwrap();
        assert_eq!(info.code, "PIPELINE-NAME-BLANK");
        assert_eq!(info.fix_hint.as_deref(), Some("Give the pipeline a name"));
    }

    #[test]
    fn test_config_parse_display() {
        let err = ConfigError::Parse {
            path: Some(PathBuf::from("engine.json")),
            message: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid config in engine.json: expected value");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ChainflowError = parse.unwrap_err().into();
        assert!(matches!(err, ChainflowError::Serialization(_)));
    }
}
