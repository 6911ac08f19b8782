//! The data carrier threaded through a chain.

use super::{ContextError, Handles};
use crate::errors::ChainflowError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;

/// An open-ended bag of named fields plus the core convention fields.
///
/// Arbitrary fields live in a JSON object map. The three convention fields
/// adapters rely on are typed:
///
/// - [`error`](Self::error): present once the pipeline is in an error state;
/// - [`result`](Self::result): the computed output;
/// - [`response_sent`](Self::response_sent): an adapter-aware step already
///   emitted a response, so the adapter must not respond again.
///
/// Values that are not JSON (response writers, pools, app state) travel in
/// [`Handles`].
#[derive(Debug, Clone, Default)]
pub struct Context {
    fields: Map<String, Value>,
    error: Option<ContextError>,
    result: Option<Value>,
    response_sent: bool,
    handles: Handles,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `ChainflowError::Serialization` if `value` is not an object.
    pub fn from_json(value: Value) -> Result<Self, ChainflowError> {
        match value {
            Value::Object(fields) => Ok(Self::from_fields(fields)),
            other => Err(ChainflowError::Serialization(format!(
                "context must be a JSON object, got {other}"
            ))),
        }
    }

    /// Creates a context holding the given fields.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Gets a field as an `i64`.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Gets a field as an `f64`.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Gets a field as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Gets a field as a bool.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Deserializes a field into `T`; `None` when absent or of the wrong shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Checks whether a field exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Borrows the field map.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mutably borrows the field map.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Returns the field names.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Returns the number of fields (convention fields excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The captured error, if the pipeline is in an error state.
    #[must_use]
    pub fn error(&self) -> Option<&ContextError> {
        self.error.as_ref()
    }

    /// True when an error is present.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Records an error, replacing any previous one.
    pub fn set_error(&mut self, error: ContextError) {
        self.error = Some(error);
    }

    /// Builder-style [`set_error`](Self::set_error).
    #[must_use]
    pub fn with_error(mut self, error: ContextError) -> Self {
        self.set_error(error);
        self
    }

    /// Removes and returns the error, leaving the context healthy.
    pub fn take_error(&mut self) -> Option<ContextError> {
        self.error.take()
    }

    /// The computed result, if any.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Sets the computed result.
    pub fn set_result(&mut self, result: impl Into<Value>) {
        self.result = Some(result.into());
    }

    /// Builder-style [`set_result`](Self::set_result).
    #[must_use]
    pub fn with_result(mut self, result: impl Into<Value>) -> Self {
        self.set_result(result);
        self
    }

    /// Removes and returns the result.
    pub fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }

    /// True once a step has emitted a response itself.
    #[must_use]
    pub fn response_sent(&self) -> bool {
        self.response_sent
    }

    /// Flags that a response has already been emitted.
    pub fn mark_response_sent(&mut self) {
        self.response_sent = true;
    }

    /// Borrows the handle map.
    #[must_use]
    pub fn handles(&self) -> &Handles {
        &self.handles
    }

    /// Mutably borrows the handle map.
    pub fn handles_mut(&mut self) -> &mut Handles {
        &mut self.handles
    }

    /// Typed shortcut for `handles().get(name)`.
    #[must_use]
    pub fn handle<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.handles.get(name)
    }

    /// Builder-style handle insertion.
    #[must_use]
    pub fn with_handle<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.handles.insert(name, value);
        self
    }

    /// Replaces the handle map.
    #[must_use]
    pub fn with_handles(mut self, handles: Handles) -> Self {
        self.handles = handles;
        self
    }

    /// Renders the context as JSON: fields plus `error`, `result` and
    /// `response_sent` when set. Handles are omitted.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), error.to_json());
        }
        if let Some(ref result) = self.result {
            map.insert("result".to_string(), result.clone());
        }
        if self.response_sent {
            map.insert("response_sent".to_string(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

// Handles are type-erased and excluded from equality.
impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.error == other.error
            && self.result == other.result
            && self.response_sent == other.response_sent
    }
}

impl From<Map<String, Value>> for Context {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}
