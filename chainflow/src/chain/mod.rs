//! Chains and the link combinators built on top of them.
//!
//! - [`Chain`]: runs links in order, middleware after each link
//! - [`parallel`]: concurrent fan-out with a merge step
//! - [`retry`]: re-runs a failing link with backoff
//! - [`timed`]: records a link's duration

mod engine;
pub mod parallel;
pub mod retry;
mod timing;

pub use engine::{chain, Chain, ErrorPolicy};
pub use parallel::{parallel, MergeStrategy, ParallelLink};
pub use retry::{retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryLink};
pub use timing::{timed, TimedLink, TIMINGS_FIELD};
