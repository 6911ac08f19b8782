//! Duration measurement for individual links.

use crate::context::Context;
use crate::links::{Link, LinkRef, LinkResult};
use crate::utils::elapsed_ms;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Field under which [`TimedLink`] records durations, keyed by link name.
pub const TIMINGS_FIELD: &str = "timings";

/// A link that records how long its inner link took, in milliseconds, as
/// `timings.<link name>`. Failures pass through unrecorded.
pub struct TimedLink {
    inner: LinkRef,
}

impl TimedLink {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: LinkRef) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Link for TimedLink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: Context) -> LinkResult {
        let started = Instant::now();
        let mut out = self.inner.run(ctx).await?;
        let took = elapsed_ms(started);

        let mut timings = match out.remove(TIMINGS_FIELD) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        timings.insert(self.inner.name().to_string(), Value::from(took));
        out.set(TIMINGS_FIELD, timings);
        Ok(out)
    }
}

/// Shorthand for `Arc::new(TimedLink::new(link))`.
#[must_use]
pub fn timed(link: LinkRef) -> LinkRef {
    Arc::new(TimedLink::new(link))
}
