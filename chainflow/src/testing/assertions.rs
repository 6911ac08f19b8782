//! Test assertions for chain output contexts.

use crate::context::{Context, ErrorKind};
use serde_json::Value;

/// Asserts that the context carries no error.
pub fn assert_no_error(ctx: &Context) {
    assert!(
        !ctx.has_error(),
        "Expected no error, got: {}",
        ctx.error().map(ToString::to_string).unwrap_or_default()
    );
}

/// Asserts that the context carries an error with the given message.
pub fn assert_error_message(ctx: &Context, expected: &str) {
    match ctx.error() {
        Some(error) => assert_eq!(
            error.message, expected,
            "Expected error message '{}', got '{}'",
            expected, error.message
        ),
        None => panic!("Expected error '{expected}', but the context has no error"),
    }
}

/// Asserts that the context's error came from the given step and kind.
pub fn assert_error_from(ctx: &Context, step: &str, kind: ErrorKind) {
    let error = ctx
        .error()
        .unwrap_or_else(|| panic!("Expected an error from '{step}', but the context has no error"));
    assert_eq!(error.step.as_deref(), Some(step), "Unexpected failing step");
    assert_eq!(error.kind, kind, "Unexpected error kind");
}

/// Asserts that a field holds the expected value.
pub fn assert_field(ctx: &Context, key: &str, expected: &Value) {
    let actual = ctx.get(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected value {:?} for field '{}', got {:?}",
        expected,
        key,
        actual
    );
}

/// Asserts that a field is absent.
pub fn assert_no_field(ctx: &Context, key: &str) {
    assert!(
        !ctx.contains(key),
        "Expected field '{}' to be absent, found {:?}",
        key,
        ctx.get(key)
    );
}
