//! # Chainflow
//!
//! A function-composition engine: heterogeneous triggers (HTTP requests,
//! scheduled jobs, CLI invocations, pub/sub messages) drive the same
//! processing pipeline through a shared [`Context`](context::Context).
//!
//! Chainflow provides:
//!
//! - **Chains**: ordered [links](links::Link) with observer
//!   [middleware](middleware::Middleware) run after every link
//! - **Error capture**: link failures and panics become data in the context,
//!   never an `Err` from the chain
//! - **Declarative pipelines**: named descriptors built through a component
//!   registry into cached chains
//! - **Feature flags** and per-environment configuration
//!
//! ## Quick Start
//!
//! ```rust
//! use chainflow::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let inc = link_fn("inc", |mut ctx| {
//!     let n = ctx.get_i64("n").unwrap_or(0);
//!     ctx.set("n", n + 1);
//!     Ok(ctx)
//! });
//! let dbl = link_fn("dbl", |mut ctx| {
//!     let n = ctx.get_i64("n").unwrap_or(0);
//!     ctx.set("n", n * 2);
//!     Ok(ctx)
//! });
//!
//! let pipeline = chain([inc, dbl]);
//! pipeline.using(std::sync::Arc::new(TimingMiddleware::default()));
//!
//! let out = pipeline.invoke(Context::new().with("n", 3)).await;
//! assert_eq!(out.get_i64("n"), Some(8));
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chain;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod links;
pub mod middleware;
pub mod observability;
pub mod registry;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::{
        chain, parallel, retry, timed, Chain, ErrorPolicy, MergeStrategy, RetryConfig,
    };
    pub use crate::config::EngineConfig;
    pub use crate::context::{
        cli_context, cron_context, http_context, message_context, Context, ContextError,
        ErrorKind, Handles,
    };
    pub use crate::engine::Engine;
    pub use crate::errors::{
        ChainflowError, ComponentNotFoundError, PipelineNotFoundError, PipelineValidationError,
    };
    pub use crate::links::{async_link, guard, link_fn, Link, LinkRef, LinkResult};
    pub use crate::middleware::{
        middleware_fn, LoggingMiddleware, Middleware, MiddlewareRef, StepInfo, TimingMiddleware,
    };
    pub use crate::registry::{ComponentRegistry, PipelineDescriptor, PipelineRegistry};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
