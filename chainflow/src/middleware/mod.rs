//! Middleware: observers that run after every link of a chain.
//!
//! Middleware sees each intermediate context, so it is invoked
//! `links × middleware` times per chain run. By contract it must not change
//! the meaning of the core fields (`error`, `result`, `response_sent`), but it
//! may add auxiliary fields such as timings.

mod logging;
mod timing;

pub use logging::LoggingMiddleware;
pub use timing::{TimingMiddleware, STEP_TIMINGS_FIELD};

use crate::context::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A shared, type-erased middleware.
pub type MiddlewareRef = Arc<dyn Middleware>;

/// Describes the link step a middleware is observing.
#[derive(Debug, Clone, Copy)]
pub struct StepInfo<'a> {
    /// Name of the chain being run.
    pub chain: &'a str,
    /// Name of the link that just ran.
    pub link: &'a str,
    /// Zero-based position of the link.
    pub index: usize,
    /// Number of links in the chain.
    pub total: usize,
    /// How long the link took.
    pub duration: Duration,
    /// Identifier of the current chain run.
    pub invocation_id: Uuid,
}

/// Trait for post-step observers.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Returns the name used in logs and captured errors.
    fn name(&self) -> &str {
        "middleware"
    }

    /// Observes the context produced by `step` and returns the (optionally
    /// annotated) context.
    async fn observe(&self, step: &StepInfo<'_>, ctx: Context) -> anyhow::Result<Context>;
}

/// A middleware backed by a synchronous closure.
pub struct FnMiddleware<F>
where
    F: Fn(&StepInfo<'_>, Context) -> anyhow::Result<Context> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&StepInfo<'_>, Context) -> anyhow::Result<Context> + Send + Sync,
{
    /// Creates a new closure-backed middleware.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&StepInfo<'_>, Context) -> anyhow::Result<Context> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, step: &StepInfo<'_>, ctx: Context) -> anyhow::Result<Context> {
        (self.func)(step, ctx)
    }
}

/// Wraps a closure as a shared middleware.
pub fn middleware_fn<F>(name: impl Into<String>, func: F) -> MiddlewareRef
where
    F: Fn(&StepInfo<'_>, Context) -> anyhow::Result<Context> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware::new(name, func))
}

#[cfg(test)]
pub(crate) fn test_step<'a>(link: &'a str, index: usize) -> StepInfo<'a> {
    StepInfo {
        chain: "test-chain",
        link,
        index,
        total: 2,
        duration: Duration::from_millis(3),
        invocation_id: Uuid::nil(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_middleware_annotates() {
        let m = middleware_fn("tagger", |step, ctx| {
            Ok(ctx.with("last_link", step.link))
        });

        assert_eq!(m.name(), "tagger");
        let out = m.observe(&test_step("inc", 0), Context::new()).await.unwrap();
        assert_eq!(out.get_str("last_link"), Some("inc"));
    }

    #[tokio::test]
    async fn test_fn_middleware_error() {
        let m = middleware_fn("strict", |_step, _ctx| Err(anyhow::anyhow!("rejected")));
        let err = m.observe(&test_step("inc", 0), Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "rejected");
    }
}
