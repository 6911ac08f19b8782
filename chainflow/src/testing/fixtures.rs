//! Test fixtures for building contexts and engines.

use serde_json::Value;

use crate::context::{Context, ContextError, Handles};
use crate::engine::Engine;
use crate::links::link_fn;

/// A test context builder.
#[derive(Debug, Default)]
pub struct TestContext {
    fields: serde_json::Map<String, Value>,
    result: Option<Value>,
    error: Option<ContextError>,
    handles: Handles,
}

impl TestContext {
    /// Creates a new test context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the result.
    #[must_use]
    pub fn with_result(mut self, result: impl Into<Value>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Starts the context in an error state.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(ContextError::validation(message));
        self
    }

    /// Adds a handle.
    #[must_use]
    pub fn with_handle<T: std::any::Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.handles.insert(name, value);
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> Context {
        let mut ctx = Context::from_fields(self.fields).with_handles(self.handles);
        if let Some(result) = self.result {
            ctx.set_result(result);
        }
        if let Some(error) = self.error {
            ctx.set_error(error);
        }
        ctx
    }
}

/// Builds an engine with the arithmetic components `inc`, `dbl` and `add`
/// (param `by`) over the integer field `n`, and a `boom` component that
/// always fails with the message "boom".
#[must_use]
pub fn arithmetic_engine() -> Engine {
    let engine = Engine::new();
    engine.register_component("inc", |_| arithmetic("inc", |n| n + 1));
    engine.register_component("dbl", |_| arithmetic("dbl", |n| n * 2));
    engine.register_component("add", |params| {
        let by = params["by"].as_i64().unwrap_or(0);
        arithmetic("add", move |n| n + by)
    });
    engine.register_component("boom", |_| link_fn("boom", |_ctx| Err(anyhow::anyhow!("boom"))));
    engine
}

fn arithmetic<F>(name: &str, op: F) -> crate::links::LinkRef
where
    F: Fn(i64) -> i64 + Send + Sync + 'static,
{
    link_fn(name.to_string(), move |mut ctx| {
        let n = op(ctx.get_i64("n").unwrap_or(0));
        ctx.set("n", n);
        Ok(ctx)
    })
}
