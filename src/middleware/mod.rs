//! Built-in middleware.
//!
//! Middleware is any [`Handler`] registered ahead of the terminal handlers,
//! globally with [`Router::middleware`](crate::Router::middleware) or per
//! method with [`Endpoint::middleware`](crate::Endpoint::middleware). The
//! ones here cover two common cross-cutting concerns:
//!
//! - [`trace`] logs each request entering the chain
//! - [`require_header`] rejects requests missing a header and exposes its
//!   value to later steps through the context

use http::StatusCode;
use serde_json::Value;
use tracing::info;

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, Outcome};
use crate::request::Request;
use crate::response::Response;

// ── trace ─────────────────────────────────────────────────────────────────────

/// Logs method and path at `INFO` for every request that reaches the chain.
pub fn trace() -> Trace {
    Trace
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Handler for Trace {
    fn call<'a>(
        &'a self,
        _ctx: &'a mut Context,
        req: &'a Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            info!(method = req.method(), path = req.path(), "request");
            Ok(Value::Null)
        })
    }
}

// ── require_header ────────────────────────────────────────────────────────────

/// Fails with `401` unless the request carries `name`.
///
/// The header's value is stored in the context under `name`, lowercased.
///
/// ```rust
/// use methodic::{handler_fn, middleware, Router};
///
/// let router = Router::new()
///     .middleware(middleware::require_header("x-api-key"))
///     .get(handler_fn(|ctx, _req, _res| Box::pin(async move {
///         Ok(ctx.get("x-api-key").cloned().unwrap_or_default())
///     })));
/// ```
pub fn require_header(name: &str) -> RequireHeader {
    RequireHeader { name: name.to_ascii_lowercase() }
}

#[derive(Clone, Debug)]
pub struct RequireHeader {
    name: String,
}

impl Handler for RequireHeader {
    fn call<'a>(
        &'a self,
        ctx: &'a mut Context,
        req: &'a Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let value = req
                .header(&self.name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::new(StatusCode::UNAUTHORIZED, format!("missing `{}` header", self.name)))?;
            ctx.insert(self.name.clone(), value);
            Ok(Value::Null)
        })
    }
}
