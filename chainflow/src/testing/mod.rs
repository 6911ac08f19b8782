//! Testing utilities for chains and pipelines.
//!
//! This module provides:
//! - Mock links and a recording middleware
//! - Assertions over output contexts
//! - Context and engine fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_error_from, assert_error_message, assert_field, assert_no_error, assert_no_field,
};
pub use fixtures::{arithmetic_engine, TestContext};
pub use mocks::{
    CountingLink, FailingLink, Observation, PanickingLink, RecordingMiddleware, SetFieldLink,
};
