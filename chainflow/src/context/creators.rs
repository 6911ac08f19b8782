//! Context creators for the trigger sources adapters bind chains to.
//!
//! Each creator stamps the common fields `source`, `received_at` and
//! `invocation_id`, then adds the trigger-specific fields links consume.
//! These shapes are conventions, not enforced types.

use super::handles::REQUEST_HANDLE;
use super::{Context, Handles};
use crate::utils::{format_timestamp, generate_invocation_id, iso_timestamp, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Field holding the [`TriggerSource`].
pub const SOURCE_FIELD: &str = "source";

/// What produced a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// An HTTP request.
    Http,
    /// A scheduled job.
    Cron,
    /// A command-line invocation.
    Cli,
    /// A pub/sub message.
    Message,
}

impl TriggerSource {
    /// Reads the trigger source recorded in a context.
    #[must_use]
    pub fn of(ctx: &Context) -> Option<Self> {
        ctx.get_as(SOURCE_FIELD)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Cron => "cron",
            Self::Cli => "cli",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn stamped(source: TriggerSource) -> Context {
    Context::new()
        .with(SOURCE_FIELD, source.as_str())
        .with("received_at", iso_timestamp())
        .with("invocation_id", generate_invocation_id().to_string())
}

/// The parts of an inbound HTTP request a pipeline sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method, upper-case.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Header map (lower-cased names).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Route parameters extracted by the router.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Parsed body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a route parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Builds an HTTP-origin context.
///
/// The request is stored both as the `request` field (JSON) and as the
/// `request` handle; response writers and application state are passed in
/// `handles` (see [`RESPONSE_HANDLE`](super::RESPONSE_HANDLE) and
/// [`APP_HANDLE`](super::APP_HANDLE)).
#[must_use]
pub fn http_context(request: HttpRequest, mut handles: Handles) -> Context {
    let request_json = serde_json::to_value(&request).unwrap_or(Value::Null);
    handles.insert(REQUEST_HANDLE, request);
    stamped(TriggerSource::Http)
        .with("request", request_json)
        .with_handles(handles)
}

/// A scheduled job firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronInvocation {
    /// Job name.
    pub job: String,
    /// Schedule expression the job was registered with.
    pub schedule: String,
    /// When the scheduler planned this run.
    #[serde(default)]
    pub scheduled_at: Option<Timestamp>,
    /// Attempt number, starting at 1.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

const fn first_attempt() -> u32 {
    1
}

impl CronInvocation {
    /// Creates a first-attempt invocation.
    #[must_use]
    pub fn new(job: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            schedule: schedule.into(),
            scheduled_at: None,
            attempt: first_attempt(),
        }
    }

    /// Sets the planned time.
    #[must_use]
    pub fn scheduled_at(mut self, at: Timestamp) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// Builds a cron-origin context.
#[must_use]
pub fn cron_context(invocation: CronInvocation) -> Context {
    stamped(TriggerSource::Cron)
        .with("job", invocation.job)
        .with("schedule", invocation.schedule)
        .with("scheduled_at", invocation.scheduled_at.as_ref().map(format_timestamp))
        .with("invoked_at", iso_timestamp())
        .with("attempt", invocation.attempt)
}

/// A parsed command-line invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliInvocation {
    /// The (sub)command name.
    pub command: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Named options.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl CliInvocation {
    /// Creates an invocation of `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets a named option.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

/// Builds a CLI-origin context.
#[must_use]
pub fn cli_context(invocation: CliInvocation) -> Context {
    stamped(TriggerSource::Cli)
        .with("command", invocation.command)
        .with("args", invocation.args)
        .with("options", json!(invocation.options))
}

/// A pub/sub message delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Topic or channel.
    pub topic: String,
    /// Decoded payload.
    pub payload: Value,
    /// Broker-assigned id.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Message attributes / headers.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Message {
    /// Creates a message on `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            message_id: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the broker id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Builds a message-origin context.
#[must_use]
pub fn message_context(message: Message) -> Context {
    stamped(TriggerSource::Message)
        .with("topic", message.topic)
        .with("payload", message.payload)
        .with("message_id", message.message_id)
        .with("attributes", json!(message.attributes))
}
