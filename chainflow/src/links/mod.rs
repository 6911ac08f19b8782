//! Links: the single-purpose units of work a chain composes.
//!
//! A link takes ownership of a [`Context`] and hands back the next one. It
//! returns `Err` to signal a failure; the chain converts that into a
//! [`ContextError`](crate::context::ContextError) rather than propagating it.

use crate::context::Context;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a link produces.
pub type LinkResult = anyhow::Result<Context>;

/// A shared, type-erased link.
pub type LinkRef = Arc<dyn Link>;

/// Trait for chain links.
///
/// Links are stateless by convention; any state they need should live
/// outside them (in a handle, or behind an `Arc` captured at construction).
#[async_trait]
pub trait Link: Send + Sync {
    /// Returns the name used in logs and captured errors.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Runs the link against `ctx`.
    async fn run(&self, ctx: Context) -> LinkResult;
}

/// A link backed by a synchronous closure.
pub struct FnLink<F>
where
    F: Fn(Context) -> LinkResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnLink<F>
where
    F: Fn(Context) -> LinkResult + Send + Sync,
{
    /// Creates a new closure-backed link.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Link for FnLink<F>
where
    F: Fn(Context) -> LinkResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        (self.func)(ctx)
    }
}

/// A link backed by an async closure.
pub struct AsyncFnLink<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = LinkResult> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnLink<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = LinkResult> + Send,
{
    /// Creates a new async closure-backed link.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Link for AsyncFnLink<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = LinkResult> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        (self.func)(ctx).await
    }
}

/// Wraps a synchronous closure as a shared link.
///
/// ```
/// use chainflow::links::{link_fn, Link};
///
/// let inc = link_fn("inc", |mut ctx| {
///     let n = ctx.get_i64("n").unwrap_or(0);
///     ctx.set("n", n + 1);
///     Ok(ctx)
/// });
/// assert_eq!(inc.name(), "inc");
/// ```
pub fn link_fn<F>(name: impl Into<String>, func: F) -> LinkRef
where
    F: Fn(Context) -> LinkResult + Send + Sync + 'static,
{
    Arc::new(FnLink::new(name, func))
}

/// Wraps an async closure as a shared link.
pub fn async_link<F, Fut>(name: impl Into<String>, func: F) -> LinkRef
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LinkResult> + Send + 'static,
{
    Arc::new(AsyncFnLink::new(name, func))
}

/// A link that passes the context through untouched when it already
/// carries an error, and otherwise delegates.
///
/// Chains built with the `continue` policy keep running after a failure;
/// wrapping a link in a guard is how a step opts out of running in that
/// state.
pub struct Guard {
    inner: LinkRef,
}

impl Guard {
    /// Guards `inner`.
    #[must_use]
    pub fn new(inner: LinkRef) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Link for Guard {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        if ctx.has_error() {
            tracing::debug!(link = self.inner.name(), "skipping guarded link, context has an error");
            return Ok(ctx);
        }
        self.inner.run(ctx).await
    }
}

/// Shorthand for `Arc::new(Guard::new(link))`.
#[must_use]
pub fn guard(link: LinkRef) -> LinkRef {
    Arc::new(Guard::new(link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;

    #[tokio::test]
    async fn test_fn_link() {
        let link = link_fn("double", |mut ctx| {
            let n = ctx.get_i64("n").unwrap_or(0);
            ctx.set("n", n * 2);
            Ok(ctx)
        });

        assert_eq!(link.name(), "double");
        let out = link.run(Context::new().with("n", 4)).await.unwrap();
        assert_eq!(out.get_i64("n"), Some(8));
    }

    #[tokio::test]
    async fn test_async_link() {
        let link = async_link("sleepy", |ctx: Context| async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            Ok(ctx.with("slept", true))
        });

        let out = link.run(Context::new()).await.unwrap();
        assert_eq!(out.get_bool("slept"), Some(true));
    }

    #[tokio::test]
    async fn test_link_error() {
        let link = link_fn("fails", |_ctx| Err(anyhow::anyhow!("boom")));
        let err = link.run(Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_guard_skips_on_error() {
        let link = guard(link_fn("mark", |ctx| Ok(ctx.with("ran", true))));
        assert_eq!(link.name(), "mark");

        let healthy = link.run(Context::new()).await.unwrap();
        assert_eq!(healthy.get_bool("ran"), Some(true));

        let failed = Context::new().with_error(ContextError::validation("bad"));
        let skipped = link.run(failed).await.unwrap();
        assert!(!skipped.contains("ran"));
        assert!(skipped.has_error());
    }
}
