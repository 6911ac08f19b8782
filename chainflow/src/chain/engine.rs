//! The chain execution engine.

use crate::context::{Context, ContextError, ErrorKind};
use crate::links::{Link, LinkRef, LinkResult};
use crate::middleware::{Middleware, MiddlewareRef, StepInfo};
use crate::utils::generate_invocation_id;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// What a chain does when a link fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Capture the error and run no further links (default).
    #[default]
    Stop,
    /// Capture the error into the context and keep running later links.
    ///
    /// Later links are not skipped automatically; wrap them in
    /// [`guard`](crate::links::guard) to opt out.
    Continue,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// An ordered list of links plus the middleware observing them.
///
/// The link list is fixed at construction. Middleware can be appended at any
/// time, including through a shared `Arc<Chain>`; appends affect runs that
/// start afterwards.
///
/// Each link receives a private clone of the last good context, so a failing
/// link can never corrupt the state an error-context is built from.
pub struct Chain {
    name: String,
    links: Vec<LinkRef>,
    middleware: RwLock<Vec<MiddlewareRef>>,
    policy: ErrorPolicy,
}

impl Chain {
    /// Creates an anonymous chain.
    #[must_use]
    pub fn new(links: impl IntoIterator<Item = LinkRef>) -> Self {
        Self::named("chain", links)
    }

    /// Creates a named chain.
    #[must_use]
    pub fn named(name: impl Into<String>, links: impl IntoIterator<Item = LinkRef>) -> Self {
        Self {
            name: name.into(),
            links: links.into_iter().collect(),
            middleware: RwLock::new(Vec::new()),
            policy: ErrorPolicy::default(),
        }
    }

    /// Sets the error policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder-style [`using`](Self::using).
    #[must_use]
    pub fn with_middleware(self, middleware: MiddlewareRef) -> Self {
        self.middleware.write().push(middleware);
        self
    }

    /// Appends a middleware and returns the same chain, so calls can be
    /// chained: `chain.using(a).using(b)` equals `chain.using_all([a, b])`.
    pub fn using(&self, middleware: MiddlewareRef) -> &Self {
        self.middleware.write().push(middleware);
        self
    }

    /// Appends several middleware in order.
    pub fn using_all(&self, middleware: impl IntoIterator<Item = MiddlewareRef>) -> &Self {
        self.middleware.write().extend(middleware);
        self
    }

    /// Returns the chain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the error policy.
    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Returns the number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns true if the chain has no links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Returns the link names in execution order.
    #[must_use]
    pub fn link_names(&self) -> Vec<String> {
        self.links.iter().map(|link| link.name().to_string()).collect()
    }

    /// Returns the number of attached middleware.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.middleware.read().len()
    }

    /// Runs the chain.
    ///
    /// Never fails: a link or middleware error (or panic) is captured into
    /// the returned context's `error` field.
    pub async fn invoke(&self, ctx: Context) -> Context {
        let invocation_id = generate_invocation_id();
        let span = tracing::debug_span!("chain", chain = %self.name, %invocation_id);
        self.execute(ctx, invocation_id).instrument(span).await
    }

    async fn execute(&self, initial: Context, invocation_id: Uuid) -> Context {
        // Snapshot so the lock is not held across awaits.
        let middleware = self.middleware.read().clone();
        let total = self.links.len();
        let mut current = initial;

        for (index, link) in self.links.iter().enumerate() {
            let started = Instant::now();
            debug!(link = link.name(), index, total, "running link");

            match run_link(link.as_ref(), current.clone()).await {
                Ok(next) => {
                    // A nested chain reports its own failure inside the context.
                    let failure = introduced_failure(&current, &next).cloned();
                    current = next;
                    if let Some(error) = failure {
                        warn!(link = link.name(), index, error = %error, policy = %self.policy, "link reported a failure");
                        if self.policy == ErrorPolicy::Stop {
                            return current;
                        }
                    }
                }
                Err(error) => {
                    warn!(link = link.name(), index, error = %error, policy = %self.policy, "link failed");
                    current.set_error(error);
                    if self.policy == ErrorPolicy::Stop {
                        return current;
                    }
                }
            }

            let step = StepInfo {
                chain: &self.name,
                link: link.name(),
                index,
                total,
                duration: started.elapsed(),
                invocation_id,
            };
            for observer in &middleware {
                match run_middleware(observer.as_ref(), &step, current.clone()).await {
                    Ok(next) => current = next,
                    Err(error) => {
                        warn!(middleware = observer.name(), link = link.name(), index, error = %error, "middleware failed");
                        current.set_error(error);
                        return current;
                    }
                }
            }
        }

        current
    }
}

async fn run_link(link: &dyn Link, ctx: Context) -> Result<Context, ContextError> {
    match AssertUnwindSafe(link.run(ctx)).catch_unwind().await {
        Ok(Ok(next)) => Ok(next),
        Ok(Err(error)) => Err(ContextError::link(link.name(), error)),
        Err(payload) => Err(ContextError::from_panic(ErrorKind::Link, link.name(), payload.as_ref())),
    }
}

// A link or middleware error present in `after` but not in `before`.
// Validation errors stay data and never halt the chain.
fn introduced_failure<'a>(before: &Context, after: &'a Context) -> Option<&'a ContextError> {
    let error = after.error()?;
    if error.kind == ErrorKind::Validation {
        return None;
    }
    match before.error() {
        Some(prior) if prior == error && prior.occurred_at == error.occurred_at => None,
        _ => Some(error),
    }
}

async fn run_middleware(
    middleware: &dyn Middleware,
    step: &StepInfo<'_>,
    ctx: Context,
) -> Result<Context, ContextError> {
    match AssertUnwindSafe(middleware.observe(step, ctx)).catch_unwind().await {
        Ok(Ok(next)) => Ok(next),
        Ok(Err(error)) => Err(ContextError::middleware(middleware.name(), error)),
        Err(payload) => Err(ContextError::from_panic(
            ErrorKind::Middleware,
            middleware.name(),
            payload.as_ref(),
        )),
    }
}

// A chain is itself a link, so chains nest. An inner failure comes back as
// data in the returned context; the outer chain applies its own policy to it.
#[async_trait]
impl Link for Chain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        Ok(self.invoke(ctx).await)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("links", &self.link_names())
            .field("middleware", &self.middleware_count())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Creates an anonymous chain from `links`.
#[must_use]
pub fn chain(links: impl IntoIterator<Item = LinkRef>) -> Chain {
    Chain::new(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{guard, link_fn};
    use crate::middleware::middleware_fn;
    use crate::testing::{CountingLink, RecordingMiddleware};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn add(name: &str, delta: i64) -> LinkRef {
        link_fn(name.to_string(), move |mut ctx| {
            let n = ctx.get_i64("n").unwrap_or(0);
            ctx.set("n", n + delta);
            Ok(ctx)
        })
    }

    fn mul(name: &str, factor: i64) -> LinkRef {
        link_fn(name.to_string(), move |mut ctx| {
            let n = ctx.get_i64("n").unwrap_or(0);
            ctx.set("n", n * factor);
            Ok(ctx)
        })
    }

    fn boom(name: &str) -> LinkRef {
        link_fn(name.to_string(), |_ctx| Err(anyhow::anyhow!("boom")))
    }

    fn mark(field: &'static str) -> LinkRef {
        link_fn(field, move |ctx| Ok(ctx.with(field, true)))
    }

    #[tokio::test]
    async fn test_links_compose_left_to_right() {
        let out = chain([add("inc", 1), mul("dbl", 2), add("dec", -3)])
            .invoke(Context::new().with("n", 3))
            .await;
        // ((3 + 1) * 2) - 3
        assert_eq!(out.get_i64("n"), Some(5));
        assert!(!out.has_error());
    }

    #[tokio::test]
    async fn test_empty_chain_returns_input() {
        let ctx = Context::new().with("n", 1);
        let out = chain(Vec::new()).invoke(ctx.clone()).await;
        assert_eq!(out, ctx);
    }

    #[tokio::test]
    async fn test_middleware_runs_after_every_link() {
        let recorder = Arc::new(RecordingMiddleware::new("recorder"));
        let c = chain([add("inc", 1), mul("dbl", 2)]);
        c.using(recorder.clone());

        let out = c.invoke(Context::new().with("n", 3)).await;

        assert_eq!(out.get_i64("n"), Some(8));
        let seen = recorder.observations();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].link, "inc");
        assert_eq!(seen[0].ctx.get_i64("n"), Some(4));
        assert_eq!(seen[1].link, "dbl");
        assert_eq!(seen[1].ctx.get_i64("n"), Some(8));
    }

    #[tokio::test]
    async fn test_middleware_order_and_fluent_use() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let tag = |label: &'static str| {
            let order = Arc::clone(&order);
            middleware_fn(label, move |step, ctx| {
                order.lock().push(format!("{}@{}", label, step.link));
                Ok(ctx)
            })
        };

        let c = chain([add("a", 1), add("b", 1)]);
        c.using(tag("m1")).using(tag("m2"));
        c.using_all([tag("m3")]);
        assert_eq!(c.middleware_count(), 3);

        c.invoke(Context::new()).await;

        assert_eq!(
            *order.lock(),
            vec!["m1@a", "m2@a", "m3@a", "m1@b", "m2@b", "m3@b"]
        );
    }

    #[tokio::test]
    async fn test_middleware_can_annotate() {
        let c = chain([add("inc", 1), add("inc2", 1)]).with_middleware(middleware_fn(
            "counter",
            |_step, mut ctx| {
                let seen = ctx.get_i64("observed").unwrap_or(0);
                ctx.set("observed", seen + 1);
                Ok(ctx)
            },
        ));

        let out = c.invoke(Context::new().with("n", 0)).await;
        assert_eq!(out.get_i64("observed"), Some(2));
    }

    #[tokio::test]
    async fn test_stop_policy_halts_on_error() {
        let third = Arc::new(CountingLink::new("third"));
        let recorder = Arc::new(RecordingMiddleware::new("recorder"));
        let c = chain([mark("first_ran"), boom("second"), third.clone() as LinkRef]);
        c.using(recorder.clone());

        let out = c.invoke(Context::new()).await;

        let error = out.error().unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.kind, ErrorKind::Link);
        assert_eq!(error.step.as_deref(), Some("second"));
        assert_eq!(out.get_bool("first_ran"), Some(true));
        assert_eq!(third.calls(), 0);
        // Middleware ran for the first link only.
        assert_eq!(recorder.observations().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_policy_runs_later_links() {
        let recorder = Arc::new(RecordingMiddleware::new("recorder"));
        let c = chain([boom("first"), mark("second_ran"), guard(mark("guarded_ran"))])
            .with_policy(ErrorPolicy::Continue)
            .with_middleware(recorder.clone());

        let out = c.invoke(Context::new()).await;

        assert_eq!(out.error().unwrap().message, "boom");
        assert_eq!(out.get_bool("second_ran"), Some(true));
        assert!(!out.contains("guarded_ran"));
        assert_eq!(recorder.observations().len(), 3);
        assert!(recorder.observations()[0].ctx.has_error());
    }

    #[tokio::test]
    async fn test_panicking_link_is_captured() {
        let c = chain([
            mark("first_ran"),
            link_fn("explodes", |_ctx| panic!("kaboom")),
            mark("third_ran"),
        ]);

        let out = c.invoke(Context::new()).await;

        let error = out.error().unwrap();
        assert!(error.panicked);
        assert_eq!(error.message, "kaboom");
        assert_eq!(error.step.as_deref(), Some("explodes"));
        assert!(!out.contains("third_ran"));
    }

    #[tokio::test]
    async fn test_middleware_error_stops_everything() {
        let after = Arc::new(RecordingMiddleware::new("after"));
        let c = chain([mark("first_ran"), mark("second_ran")]).with_policy(ErrorPolicy::Continue);
        c.using(middleware_fn("strict", |_step, _ctx| Err(anyhow::anyhow!("audit down"))))
            .using(after.clone());

        let out = c.invoke(Context::new()).await;

        let error = out.error().unwrap();
        assert_eq!(error.kind, ErrorKind::Middleware);
        assert_eq!(error.step.as_deref(), Some("strict"));
        assert_eq!(out.get_bool("first_ran"), Some(true));
        assert!(!out.contains("second_ran"));
        assert!(after.observations().is_empty());
    }

    #[tokio::test]
    async fn test_failed_link_does_not_leak_partial_state() {
        let c = chain([link_fn("half-done", |ctx| {
            let _partial = ctx.with("partial", true);
            Err(anyhow::anyhow!("gave up"))
        })]);

        let out = c.invoke(Context::new().with("n", 1)).await;
        assert!(!out.contains("partial"));
        assert_eq!(out.get_i64("n"), Some(1));
    }

    #[tokio::test]
    async fn test_nested_chain_is_a_link() {
        let inner: LinkRef = Arc::new(Chain::named("inner", [add("inc", 1), mul("dbl", 2)]));
        let outer = Chain::named("outer", [inner, add("inc", 10)]);

        let out = outer.invoke(Context::new().with("n", 3)).await;
        assert_eq!(out.get_i64("n"), Some(18));
    }

    #[tokio::test]
    async fn test_nested_chain_failure_stops_outer_chain() {
        let recorder = Arc::new(RecordingMiddleware::new("recorder"));
        let inner: LinkRef = Arc::new(Chain::named("inner", [add("inc", 1), boom("explode")]));
        let outer = Chain::named("outer", [inner, mark("after_ran")]);
        outer.using(recorder.clone());

        let out = outer.invoke(Context::new().with("n", 3)).await;

        let error = out.error().unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.kind, ErrorKind::Link);
        assert_eq!(error.step.as_deref(), Some("explode"));
        assert_eq!(out.get_i64("n"), Some(4));
        assert!(!out.contains("after_ran"));
        assert!(recorder.observations().is_empty());
    }

    #[tokio::test]
    async fn test_nested_chain_failure_under_continue() {
        let inner: LinkRef = Arc::new(Chain::named("inner", [boom("explode")]));
        let outer = Chain::named("outer", [inner, mark("after_ran"), guard(mark("guarded_ran"))])
            .with_policy(ErrorPolicy::Continue);

        let out = outer.invoke(Context::new()).await;

        assert_eq!(out.error().unwrap().step.as_deref(), Some("explode"));
        assert_eq!(out.get_bool("after_ran"), Some(true));
        assert!(!out.contains("guarded_ran"));
    }

    #[tokio::test]
    async fn test_validation_error_does_not_stop_chain() {
        let c = chain([
            link_fn("check", |ctx| Ok(ctx.with_error(ContextError::validation("missing email")))),
            mark("after_ran"),
        ]);

        let out = c.invoke(Context::new()).await;

        assert_eq!(out.error().unwrap().kind, ErrorKind::Validation);
        assert_eq!(out.get_bool("after_ran"), Some(true));
    }

    #[tokio::test]
    async fn test_shared_chain_accepts_middleware() {
        let shared = Arc::new(chain([add("inc", 1)]));
        let recorder = Arc::new(RecordingMiddleware::new("recorder"));

        shared.using(recorder.clone());
        shared.invoke(Context::new()).await;
        shared.invoke(Context::new()).await;

        assert_eq!(recorder.observations().len(), 2);
    }

    #[test]
    fn test_debug_and_accessors() {
        let c = Chain::named("orders", [add("inc", 1), mul("dbl", 2)]).with_policy(ErrorPolicy::Continue);
        assert_eq!(c.name(), "orders");
        assert_eq!(c.len(), 2);
        assert!(!c.is_empty());
        assert_eq!(c.link_names(), vec!["inc", "dbl"]);
        assert_eq!(c.policy(), ErrorPolicy::Continue);
        assert!(format!("{c:?}").contains("orders"));
    }

    #[test]
    fn test_policy_serde() {
        assert_eq!(serde_json::to_string(&ErrorPolicy::Continue).unwrap(), "\"continue\"");
        let policy: ErrorPolicy = serde_json::from_str("\"stop\"").unwrap();
        assert_eq!(policy, ErrorPolicy::Stop);
    }
}
