//! Identifier generation.

use uuid::Uuid;

/// Generates a random identifier for one chain invocation or trigger event.
#[must_use]
pub fn generate_invocation_id() -> Uuid {
    Uuid::new_v4()
}
