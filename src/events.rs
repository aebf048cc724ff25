//! Error notifications.
//!
//! The router reports every failure it turns into an error response to the
//! listeners registered with [`Router::on_error`](crate::Router::on_error).
//! It logs nothing itself; [`log_errors`] is the stock listener for that.

use std::sync::Arc;

use tracing::{error, warn};

use crate::context::Context;
use crate::error::{Error, ErrorKind};
use crate::request::Request;
use crate::response::{Phase, Response};

/// One failure, with everything needed to diagnose it.
#[derive(Debug)]
pub struct ErrorEvent<'a> {
    /// The original error. For `Unhandled` failures this still holds the
    /// real message, unlike the body sent to the client.
    pub error: &'a Error,
    /// The request's context as it was when the failure happened.
    pub context: &'a Context,
    pub request: &'a Request,
    /// The response before the error body is written.
    pub response: &'a Response,
    /// The phase the request failed in.
    pub phase: Phase,
}

/// A registered error listener.
pub type ErrorListener = Arc<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;

/// Logs each failure through `tracing`: server errors at `ERROR`, client
/// errors at `WARN`.
///
/// ```rust
/// use methodic::{events, Router};
///
/// let router = Router::new().on_error(events::log_errors);
/// ```
pub fn log_errors(event: &ErrorEvent<'_>) {
    let status = event.error.status().as_u16();
    let method = event.request.method();
    let path = event.request.path();

    if event.error.status().is_server_error() {
        let unhandled = event.error.kind() == ErrorKind::Unhandled;
        error!(
            status,
            method,
            path,
            phase = ?event.phase,
            unhandled,
            context = ?event.context,
            "request failed: {}",
            event.error,
        );
    } else {
        warn!(status, method, path, phase = ?event.phase, "request rejected: {}", event.error);
    }
}
