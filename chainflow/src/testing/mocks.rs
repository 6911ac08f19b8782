//! Mock links and middleware for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::Context;
use crate::links::{Link, LinkResult};
use crate::middleware::{Middleware, StepInfo};

/// A link that counts its calls and passes the context through.
#[derive(Debug)]
pub struct CountingLink {
    name: String,
    calls: AtomicUsize,
}

impl CountingLink {
    /// Creates a new counting link.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the link ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Link for CountingLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ctx)
    }
}

/// A link that fails a fixed number of times, then passes through.
#[derive(Debug)]
pub struct FailingLink {
    name: String,
    failures: usize,
    calls: AtomicUsize,
}

impl FailingLink {
    /// Fails the first `failures` calls.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call.
    #[must_use]
    pub fn always(name: impl Into<String>) -> Self {
        Self::new(name, usize::MAX)
    }

    /// Returns the number of times the link ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Link for FailingLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            anyhow::bail!("{} failed on call {call}", self.name);
        }
        Ok(ctx)
    }
}

/// A link that sets one field.
#[derive(Debug, Clone)]
pub struct SetFieldLink {
    name: String,
    field: String,
    value: Value,
}

impl SetFieldLink {
    /// Sets `field` to `value`; the link is named after the field.
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        Self {
            name: format!("set_{field}"),
            field,
            value: value.into(),
        }
    }
}

#[async_trait]
impl Link for SetFieldLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        Ok(ctx.with(self.field.clone(), self.value.clone()))
    }
}

/// A link that panics with a fixed message.
#[derive(Debug, Clone)]
pub struct PanickingLink {
    name: String,
    message: String,
}

impl PanickingLink {
    /// Creates a new panicking link.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Link for PanickingLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: Context) -> LinkResult {
        panic!("{}", self.message)
    }
}

/// One call seen by a [`RecordingMiddleware`].
#[derive(Debug, Clone)]
pub struct Observation {
    /// Link that had just run.
    pub link: String,
    /// Position of that link.
    pub index: usize,
    /// Context the middleware received.
    pub ctx: Context,
}

/// Middleware that records every context it observes.
#[derive(Debug)]
pub struct RecordingMiddleware {
    name: String,
    observations: Mutex<Vec<Observation>>,
}

impl RecordingMiddleware {
    /// Creates a new recorder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observations: Mutex::new(Vec::new()),
        }
    }

    /// Returns everything recorded so far.
    #[must_use]
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    /// Returns the names of the observed links, in order.
    #[must_use]
    pub fn links(&self) -> Vec<String> {
        self.observations.lock().iter().map(|o| o.link.clone()).collect()
    }

    /// Clears the recording.
    pub fn reset(&self) {
        self.observations.lock().clear();
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, step: &StepInfo<'_>, ctx: Context) -> anyhow::Result<Context> {
        self.observations.lock().push(Observation {
            link: step.link.to_string(),
            index: step.index,
            ctx: ctx.clone(),
        });
        Ok(ctx)
    }
}
