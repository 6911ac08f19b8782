//! Declarative pipeline descriptors.

use crate::chain::ErrorPolicy;
use crate::errors::{ErrorInfo, PipelineValidationError};
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_version() -> String {
    "1.0.0".to_string()
}

/// One step of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepDescriptor {
    /// Built by the named component factory with `params`.
    Component {
        /// Factory name.
        name: String,
        /// Parameters handed to the factory.
        #[serde(default)]
        params: Value,
    },
    /// A ready-made link registered under `name`.
    Link {
        /// Link name.
        name: String,
    },
}

impl StepDescriptor {
    /// Returns the referenced registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Component { name, .. } | Self::Link { name } => name,
        }
    }
}

/// Named, declarative description of a chain.
///
/// Holds no executable code: every step and middleware is a name resolved
/// through the [`ComponentRegistry`](super::ComponentRegistry) when the
/// pipeline is built.
///
/// ```
/// use chainflow::registry::PipelineDescriptor;
///
/// let descriptor: PipelineDescriptor = serde_json::from_str(r#"{
///     "name": "checkout",
///     "errorHandling": "continue",
///     "steps": [
///         {"type": "component", "name": "validate", "params": {"strict": true}},
///         {"type": "link", "name": "persist"}
///     ],
///     "middleware": ["timing"]
/// }"#).unwrap();
/// assert_eq!(descriptor.steps.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    /// Pipeline name.
    #[serde(default)]
    pub name: String,
    /// Free-form version label.
    #[serde(default = "default_version")]
    pub version: String,
    /// Error policy; the engine default applies when absent.
    #[serde(default, alias = "errorHandling", skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorPolicy>,
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
    /// Names of middleware to attach, in order.
    #[serde(default)]
    pub middleware: Vec<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PipelineDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            error_handling: None,
            steps: Vec::new(),
            middleware: Vec::new(),
            description: None,
        }
    }

    /// Sets the version label.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the error policy.
    #[must_use]
    pub fn with_error_handling(mut self, policy: ErrorPolicy) -> Self {
        self.error_handling = Some(policy);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a component step.
    #[must_use]
    pub fn component(mut self, name: impl Into<String>, params: Value) -> Self {
        self.steps.push(StepDescriptor::Component {
            name: name.into(),
            params,
        });
        self
    }

    /// Appends a named-link step.
    #[must_use]
    pub fn link(mut self, name: impl Into<String>) -> Self {
        self.steps.push(StepDescriptor::Link { name: name.into() });
        self
    }

    /// Appends a middleware reference.
    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        self.middleware.push(name.into());
        self
    }

    /// Checks the descriptor for structural mistakes.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name must not be blank")
                .with_error_info(
                    ErrorInfo::new("PIPELINE-NAME-BLANK", "Blank pipeline name")
                        .with_fix_hint("Register the descriptor under a non-empty name."),
                ));
        }

        if let Some(index) = self.steps.iter().position(|step| step.name().trim().is_empty()) {
            return Err(PipelineValidationError::new(format!(
                "Step {index} of pipeline '{}' has a blank name",
                self.name
            ))
            .with_pipeline(&self.name)
            .with_error_info(
                ErrorInfo::new("PIPELINE-STEP-BLANK", "Blank step name")
                    .with_context_entry("index", index.to_string()),
            ));
        }

        if self.middleware.iter().any(|name| name.trim().is_empty()) {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' references a blank middleware name",
                self.name
            ))
            .with_pipeline(&self.name)
            .with_error_info(ErrorInfo::new("PIPELINE-MIDDLEWARE-BLANK", "Blank middleware name")));
        }

        Ok(())
    }

    /// Returns the SHA-256 hex digest of the descriptor's JSON form.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        sha256_hex(&encoded)
    }
}
