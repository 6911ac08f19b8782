//! Middleware that logs every step through `tracing`.

use super::{Middleware, StepInfo};
use crate::context::Context;
use async_trait::async_trait;
use tracing::{debug, info, warn, Level};

/// Logs each step outcome at a configurable level.
///
/// Steps whose context carries an error are always logged at `WARN`.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    level: Level,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingMiddleware {
    /// Creates a logging middleware with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging middleware.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging middleware.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    /// Returns the configured level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    fn log_step(&self, step: &StepInfo<'_>, ctx: &Context) {
        let duration_ms = step.duration.as_secs_f64() * 1000.0;
        if let Some(error) = ctx.error() {
            warn!(
                chain = step.chain,
                link = step.link,
                index = step.index,
                duration_ms,
                error = %error,
                "step finished with error"
            );
            return;
        }
        match self.level {
            Level::DEBUG | Level::TRACE => debug!(
                chain = step.chain,
                link = step.link,
                index = step.index,
                total = step.total,
                duration_ms,
                "step finished"
            ),
            _ => info!(
                chain = step.chain,
                link = step.link,
                index = step.index,
                total = step.total,
                duration_ms,
                "step finished"
            ),
        }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn observe(&self, step: &StepInfo<'_>, ctx: Context) -> anyhow::Result<Context> {
        self.log_step(step, &ctx);
        Ok(ctx)
    }
}
