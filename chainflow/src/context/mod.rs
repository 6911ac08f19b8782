//! The context carried through chains.
//!
//! This module provides:
//! - [`Context`], the copy-on-write data carrier
//! - [`ContextError`], the captured-error record
//! - [`Handles`] for non-serializable values such as response writers
//! - context creators for HTTP, cron, CLI and message triggers

mod creators;
mod data;
mod error;
mod handles;

pub use creators::{
    cli_context, cron_context, http_context, message_context, CliInvocation, CronInvocation,
    HttpRequest, Message, TriggerSource, SOURCE_FIELD,
};
pub use data::Context;
pub use error::{ContextError, ErrorKind};
pub use handles::{Handles, APP_HANDLE, REQUEST_HANDLE, RESPONSE_HANDLE};
