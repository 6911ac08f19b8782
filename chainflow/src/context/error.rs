//! The error record a context carries once a pipeline is in an error state.

use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Where a captured error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// A link returned an error or panicked.
    Link,
    /// A middleware returned an error or panicked.
    Middleware,
    /// A link reported a business-level failure without raising.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => write!(f, "link"),
            Self::Middleware => write!(f, "middleware"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// An error captured into a [`Context`](super::Context).
///
/// The original `anyhow::Error` is kept (shared) so callers can downcast to
/// the concrete failure; it is not serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextError {
    /// Human-readable message (the top-level message of the original error).
    pub message: String,
    /// Where the error came from.
    pub kind: ErrorKind,
    /// Name of the failing link or middleware, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Whether the step panicked rather than returning an error.
    #[serde(default)]
    pub panicked: bool,
    /// When the error was captured.
    pub occurred_at: Timestamp,
    #[serde(skip)]
    source: Option<Arc<anyhow::Error>>,
}

impl ContextError {
    fn build(kind: ErrorKind, step: Option<String>, message: String) -> Self {
        Self {
            message,
            kind,
            step,
            panicked: false,
            occurred_at: now_utc(),
            source: None,
        }
    }

    /// Wraps an error returned by a link.
    #[must_use]
    pub fn link(step: impl Into<String>, error: anyhow::Error) -> Self {
        Self::build(ErrorKind::Link, Some(step.into()), error.to_string()).with_source(error)
    }

    /// Wraps an error returned by a middleware.
    #[must_use]
    pub fn middleware(step: impl Into<String>, error: anyhow::Error) -> Self {
        Self::build(ErrorKind::Middleware, Some(step.into()), error.to_string())
            .with_source(error)
    }

    /// A business-level failure a link records itself.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Validation, None, message.into())
    }

    /// Converts a caught panic payload into an error record.
    #[must_use]
    pub fn from_panic(kind: ErrorKind, step: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let mut error = Self::build(kind, Some(step.into()), panic_message(payload));
        error.panicked = true;
        error
    }

    /// Names the step that produced this error.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    fn with_source(mut self, error: anyhow::Error) -> Self {
        self.source = Some(Arc::new(error));
        self
    }

    /// The original error, when one was captured.
    #[must_use]
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcasts the original error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.source().and_then(anyhow::Error::downcast_ref::<E>)
    }

    /// Converts to a JSON object suitable for adapter responses and logs.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "message": self.message }))
    }
}

// Equality ignores the capture time and the shared source.
impl PartialEq for ContextError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.step == other.step
            && self.panicked == other.panicked
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "{} '{}' failed: {}", self.kind, step, self.message),
            None => write!(f, "{} failed: {}", self.kind, self.message),
        }
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded for {0}")]
    struct QuotaError(String);

    #[test]
    fn test_link_error_keeps_message_and_source() {
        let err = ContextError::link("charge", anyhow::anyhow!("boom"));
        assert_eq!(err.message, "boom");
        assert_eq!(err.kind, ErrorKind::Link);
        assert_eq!(err.step.as_deref(), Some("charge"));
        assert!(err.source().is_some());
        assert!(!err.panicked);
    }

    #[test]
    fn test_downcast_to_original_error() {
        let err = ContextError::link("charge", QuotaError("acme".to_string()).into());
        let original = err.downcast_ref::<QuotaError>().unwrap();
        assert_eq!(original.0, "acme");
        assert_eq!(err.message, "quota exceeded for acme");
    }

    #[test]
    fn test_panic_payloads() {
        let static_payload: Box<dyn Any + Send> = Box::new("static message");
        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        let other_payload: Box<dyn Any + Send> = Box::new(42_u8);

        let err = ContextError::from_panic(ErrorKind::Link, "l", static_payload.as_ref());
        assert_eq!(err.message, "static message");
        assert!(err.panicked);
        assert_eq!(panic_message(owned_payload.as_ref()), "owned message");
        assert_eq!(panic_message(other_payload.as_ref()), "panic with non-string payload");
    }

    #[test]
    fn test_to_json_omits_source() {
        let err = ContextError::validation("missing email");
        let json = err.to_json();
        assert_eq!(json["message"], "missing email");
        assert_eq!(json["kind"], "validation");
        assert!(json.get("step").is_none());
        assert!(json.get("source").is_none());
    }

    #[test]
    fn test_display() {
        let err = ContextError::middleware("audit", anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "middleware 'audit' failed: disk full");
        assert_eq!(
            ContextError::validation("bad input").to_string(),
            "validation failed: bad input"
        );
    }
}
