//! Middleware that records how long each step took.

use super::{Middleware, StepInfo};
use crate::context::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Default field the timing entries are appended to.
pub const STEP_TIMINGS_FIELD: &str = "step_timings";

/// Appends `{link, index, duration_ms}` to an array field after every step.
///
/// Measures only; it never enforces a deadline.
#[derive(Debug, Clone)]
pub struct TimingMiddleware {
    field: String,
}

impl Default for TimingMiddleware {
    fn default() -> Self {
        Self::new(STEP_TIMINGS_FIELD)
    }
}

impl TimingMiddleware {
    /// Records into `field` instead of the default.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Returns the field timings are written to.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        "timing"
    }

    async fn observe(&self, step: &StepInfo<'_>, mut ctx: Context) -> anyhow::Result<Context> {
        let entry = json!({
            "link": step.link,
            "index": step.index,
            "duration_ms": step.duration.as_secs_f64() * 1000.0,
        });
        match ctx.fields_mut().get_mut(&self.field) {
            Some(Value::Array(entries)) => entries.push(entry),
            _ => {
                ctx.set(self.field.clone(), Value::Array(vec![entry]));
            }
        }
        Ok(ctx)
    }
}
