//! Opt-in fan-out: run several links concurrently and merge their contexts.

use crate::context::Context;
use crate::links::{Link, LinkRef, LinkResult};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

/// How branch contexts are folded back into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Apply each branch's changed and removed fields onto the input, in
    /// branch order; later branches win on conflicts.
    #[default]
    Overlay,
    /// Store each branch's full field map under the branch link's name.
    Namespaced,
}

/// A link that runs its branches concurrently against clones of the input.
///
/// Regardless of strategy, the merged context takes the `result` of the
/// last branch that produced a new one, the first branch-recorded error,
/// and `response_sent` if any branch sent a response. If a branch fails
/// outright, the combinator fails with the first failure in branch order.
pub struct ParallelLink {
    name: String,
    branches: Vec<LinkRef>,
    strategy: MergeStrategy,
}

impl ParallelLink {
    /// Creates a parallel link over `branches`.
    #[must_use]
    pub fn new(branches: impl IntoIterator<Item = LinkRef>) -> Self {
        Self {
            name: "parallel".to_string(),
            branches: branches.into_iter().collect(),
            strategy: MergeStrategy::default(),
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the merge strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn merge(&self, input: &Context, branch: &LinkRef, output: Context, merged: &mut Context) {
        match self.strategy {
            MergeStrategy::Overlay => {
                for (key, value) in output.fields() {
                    if input.get(key) != Some(value) {
                        merged.set(key.clone(), value.clone());
                    }
                }
                for key in input.fields().keys() {
                    if !output.contains(key) {
                        merged.remove(key);
                    }
                }
            }
            MergeStrategy::Namespaced => {
                merged.set(branch.name(), Value::Object(output.fields().clone()));
            }
        }

        if let Some(result) = output.result() {
            if input.result() != Some(result) {
                merged.set_result(result.clone());
            }
        }
        if output.response_sent() {
            merged.mark_response_sent();
        }
        if !merged.has_error() {
            if let Some(error) = output.error() {
                merged.set_error(error.clone());
            }
        }
        merged.handles_mut().absorb(output.handles());
    }
}

#[async_trait]
impl Link for ParallelLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        let outcomes = join_all(self.branches.iter().map(|branch| branch.run(ctx.clone()))).await;

        let mut merged = ctx.clone();
        for (branch, outcome) in self.branches.iter().zip(outcomes) {
            let output = outcome?;
            self.merge(&ctx, branch, output, &mut merged);
        }
        tracing::debug!(link = %self.name, branches = self.branches.len(), "parallel branches merged");
        Ok(merged)
    }
}

/// Runs `links` concurrently with the default [`MergeStrategy::Overlay`].
#[must_use]
pub fn parallel(links: impl IntoIterator<Item = LinkRef>) -> LinkRef {
    Arc::new(ParallelLink::new(links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::chain;
    use crate::context::ContextError;
    use crate::links::{async_link, link_fn};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn sleeper(name: &'static str, ms: u64) -> LinkRef {
        async_link(name, move |ctx: Context| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ctx.with(name, ms))
        })
    }

    #[tokio::test]
    async fn test_overlay_merges_branch_fields() {
        let link = parallel([
            link_fn("a", |ctx| Ok(ctx.with("a", 1))),
            link_fn("b", |ctx| Ok(ctx.with("b", 2).with_result("from-b"))),
        ]);

        let out = link.run(Context::new().with("seed", true)).await.unwrap();

        assert_eq!(out.get_bool("seed"), Some(true));
        assert_eq!(out.get_i64("a"), Some(1));
        assert_eq!(out.get_i64("b"), Some(2));
        assert_eq!(out.result(), Some(&json!("from-b")));
    }

    #[tokio::test]
    async fn test_unchanged_fields_do_not_clobber() {
        let link = parallel([
            link_fn("writer", |ctx| Ok(ctx.with("n", 10))),
            link_fn("reader", Ok),
        ]);

        let out = link.run(Context::new().with("n", 1)).await.unwrap();
        assert_eq!(out.get_i64("n"), Some(10));
    }

    #[tokio::test]
    async fn test_overlay_applies_removed_fields() {
        let link = parallel([
            link_fn("scrub", |mut ctx| {
                ctx.remove("token");
                Ok(ctx)
            }),
            link_fn("tag", |ctx| Ok(ctx.with("tagged", true))),
        ]);

        let out = link
            .run(Context::new().with("token", "secret").with("user", "ana"))
            .await
            .unwrap();

        assert!(!out.contains("token"));
        assert_eq!(out.get_str("user"), Some("ana"));
        assert_eq!(out.get_bool("tagged"), Some(true));
    }

    #[tokio::test]
    async fn test_branches_run_concurrently() {
        let link = parallel([sleeper("slow_a", 50), sleeper("slow_b", 50), sleeper("slow_c", 50)]);

        let started = Instant::now();
        let out = link.run(Context::new()).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(140));
        assert_eq!(out.get_i64("slow_a"), Some(50));
        assert_eq!(out.get_i64("slow_c"), Some(50));
    }

    #[tokio::test]
    async fn test_namespaced_strategy() {
        let link = ParallelLink::new([
            link_fn("left", |ctx| Ok(ctx.with("v", "l"))),
            link_fn("right", |ctx| Ok(ctx.with("v", "r"))),
        ])
        .with_strategy(MergeStrategy::Namespaced);

        let out = link.run(Context::new()).await.unwrap();
        assert_eq!(out.get("left"), Some(&json!({"v": "l"})));
        assert_eq!(out.get("right"), Some(&json!({"v": "r"})));
        assert!(!out.contains("v"));
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let link = parallel([
            link_fn("ok", |ctx| Ok(ctx.with("ok", true))),
            link_fn("first", |_ctx| Err(anyhow::anyhow!("first failure"))),
            link_fn("second", |_ctx| Err(anyhow::anyhow!("second failure"))),
        ]);

        let err = link.run(Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "first failure");
    }

    #[tokio::test]
    async fn test_branch_validation_error_and_response_flag() {
        let link = parallel([
            link_fn("validator", |ctx| Ok(ctx.with_error(ContextError::validation("bad email")))),
            link_fn("responder", |mut ctx| {
                ctx.mark_response_sent();
                Ok(ctx)
            }),
        ]);

        let out = link.run(Context::new()).await.unwrap();
        assert_eq!(out.error().unwrap().message, "bad email");
        assert!(out.response_sent());
    }

    #[tokio::test]
    async fn test_failure_inside_chain_is_captured() {
        let c = chain([
            parallel([link_fn("bad", |_ctx| Err(anyhow::anyhow!("branch down")))]),
            link_fn("after", |ctx| Ok(ctx.with("after", true))),
        ]);

        let out = c.invoke(Context::new()).await;
        assert_eq!(out.error().unwrap().message, "branch down");
        assert_eq!(out.error().unwrap().step.as_deref(), Some("parallel"));
        assert!(!out.contains("after"));
    }
}
