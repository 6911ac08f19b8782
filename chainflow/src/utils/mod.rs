//! Time, identifier and hashing helpers shared across the engine.

mod fingerprint;
mod ids;
pub mod timestamps;

pub use fingerprint::sha256_hex;
pub use ids::generate_invocation_id;
pub use timestamps::{elapsed_ms, format_timestamp, iso_timestamp, now_utc, Timestamp};
