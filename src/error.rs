//! Unified error type and its wire shape.
//!
//! Every failure a request can hit is an [`Error`]: bad input, a response
//! that breaks its schema, an unbound method, or anything a handler raises.
//! The router turns it into exactly one JSON body:
//!
//! ```json
//! { "type": "BadRequestError", "message": "'body' must have required property 'foo'", "status": 400 }
//! ```

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::schema::{Slot, Violation};

/// A boxed error from user code or a dependency.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Wire message for failures whose details must not reach the client.
pub(crate) const GENERIC_MESSAGE: &str = "internal server error occurred";

/// What went wrong, independent of the status it maps to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Query or body failed its schema. Client fault.
    InvalidInput(Slot),
    /// The outbound payload failed its response schema. Server fault.
    InvalidOutput,
    /// No handler is bound for the request's method.
    NotFound,
    /// An HTTP error raised on purpose by a middleware or handler.
    Http,
    /// Anything else. The original message is kept for listeners but never sent.
    Unhandled,
}

/// The error type flowing through the handler chain and the router.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    status: StatusCode,
    message: String,
    #[source]
    source: Option<BoxError>,
    context: Option<Context>,
}

impl Error {
    /// An HTTP error with an explicit status, e.g. `401 missing token`.
    ///
    /// Statuses below 400 are not errors; they are replaced by `500`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let status = if status.as_u16() < 400 { StatusCode::INTERNAL_SERVER_ERROR } else { status };
        Self::build(ErrorKind::Http, status, message.into())
    }

    /// `404 Not Found`: no handler bound for the method.
    pub fn not_found() -> Self {
        Self::build(ErrorKind::NotFound, StatusCode::NOT_FOUND, "Not Found".to_owned())
    }

    /// Wraps an arbitrary failure as a `500`, preserving its message and source.
    pub fn unhandled(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        let mut err = Self::build(
            ErrorKind::Unhandled,
            StatusCode::INTERNAL_SERVER_ERROR,
            source.to_string(),
        );
        err.source = Some(source);
        err
    }

    /// A `500` with a message and no underlying source.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Unhandled, StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    pub(crate) fn invalid_input(slot: Slot, violations: &[Violation]) -> Self {
        Self::build(
            ErrorKind::InvalidInput(slot),
            StatusCode::BAD_REQUEST,
            render(slot, violations),
        )
    }

    pub(crate) fn invalid_output(violations: &[Violation]) -> Self {
        Self::build(
            ErrorKind::InvalidOutput,
            StatusCode::INTERNAL_SERVER_ERROR,
            render(Slot::Response, violations),
        )
    }

    /// Converts a caught panic payload into an `Unhandled` error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_owned());
        Self::internal(message)
    }

    fn build(kind: ErrorKind, status: StatusCode, message: String) -> Self {
        Self { kind, status, message, source: None, context: None }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The original message, including for `Unhandled` errors.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The request's context as it was when the chain failed.
    ///
    /// Present on every error returned by [`HandlerUnit::run`](crate::HandlerUnit::run).
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub(crate) fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// The wire `type` label, derived from the status reason phrase.
    pub fn type_name(&self) -> String {
        type_name(self.status)
    }

    /// The JSON body the router writes for this error.
    pub fn to_body(&self) -> ErrorBody {
        match self.kind {
            ErrorKind::Unhandled => ErrorBody {
                kind: type_name(StatusCode::INTERNAL_SERVER_ERROR),
                message: GENERIC_MESSAGE.to_owned(),
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            },
            _ => ErrorBody {
                kind: self.type_name(),
                message: self.message.clone(),
                status: self.status.as_u16(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::unhandled(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::unhandled(e)
    }
}

/// Wire contract for error responses: `{"type", "message", "status"}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub status: u16,
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.kind, self.message)
    }
}

/// `'<slot><path>' <message>` for each violation, comma-joined.
fn render(slot: Slot, violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("'{slot}{}' {}", v.path, v.message))
        .collect::<Vec<_>>()
        .join(", ")
}

// "Not Found" -> "NotFoundError", "Internal Server Error" -> "InternalServerError".
fn type_name(status: StatusCode) -> String {
    let Some(reason) = status.canonical_reason() else {
        return if status.is_server_error() { "InternalServerError".into() } else { "HttpError".into() };
    };
    let mut name: String = reason.chars().filter(char::is_ascii_alphanumeric).collect();
    if !name.ends_with("Error") {
        name.push_str("Error");
    }
    name
}
