//! Method router for a single endpoint.
//!
//! One [`HandlerUnit`] per HTTP method, global middleware captured at
//! registration time, and one place where every failure becomes a response.
//! Build it once at startup; after that it is only read.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::Error;
use crate::events::{ErrorEvent, ErrorListener};
use crate::handler::{BoxedHandler, Endpoint, Handler};
use crate::method::Method;
use crate::registry::{Registry, Signature};
use crate::request::Request;
use crate::response::{Phase, Response};

/// The endpoint router.
///
/// Each builder call returns `self` so registrations chain naturally:
///
/// ```rust
/// use methodic::{handler_fn, middleware, Router};
/// use serde_json::json;
///
/// let router = Router::new()
///     .middleware(middleware::trace())
///     .get(handler_fn(|_ctx, _req, _res| Box::pin(async move { Ok(json!({ "items": [] })) })))
///     .post(handler_fn(|_ctx, req, _res| Box::pin(async move { Ok(req.body().clone()) })));
///
/// assert_eq!(router.signatures().len(), 2);
/// ```
///
/// Middleware added with [`middleware`](Router::middleware) applies only to
/// methods registered after it.
#[derive(Default)]
pub struct Router {
    middlewares: Vec<BoxedHandler>,
    registry: Registry,
    listeners: Vec<ErrorListener>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends global middleware for every method registered from now on.
    pub fn middleware(mut self, middleware: impl Handler) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn get(self, endpoint: impl Into<Endpoint>) -> Self {
        self.on(Method::Get, endpoint)
    }

    pub fn post(self, endpoint: impl Into<Endpoint>) -> Self {
        self.on(Method::Post, endpoint)
    }

    pub fn put(self, endpoint: impl Into<Endpoint>) -> Self {
        self.on(Method::Put, endpoint)
    }

    pub fn patch(self, endpoint: impl Into<Endpoint>) -> Self {
        self.on(Method::Patch, endpoint)
    }

    pub fn delete(self, endpoint: impl Into<Endpoint>) -> Self {
        self.on(Method::Delete, endpoint)
    }

    pub fn options(self, endpoint: impl Into<Endpoint>) -> Self {
        self.on(Method::Options, endpoint)
    }

    /// Binds `endpoint` to `method` behind the current global middleware.
    ///
    /// # Panics
    ///
    /// Panics if one of the endpoint's schemas does not compile. Use
    /// [`try_on`](Router::try_on) for schemas loaded at runtime.
    pub fn on(self, method: Method, endpoint: impl Into<Endpoint>) -> Self {
        self.try_on(method, endpoint)
            .unwrap_or_else(|e| panic!("invalid schema for {method}: {e}"))
    }

    /// Like [`on`](Router::on), but reports schema errors instead of panicking.
    pub fn try_on(mut self, method: Method, endpoint: impl Into<Endpoint>) -> Result<Self, Error> {
        let snapshot = self.middlewares.clone();
        self.registry.register(method, snapshot, endpoint.into())?;
        Ok(self)
    }

    /// Registers a listener called once for every failure the router handles.
    pub fn on_error(mut self, listener: impl Fn(&ErrorEvent<'_>) + Send + Sync + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// One [`Signature`] per bound method.
    pub fn signatures(&self) -> Vec<Signature> {
        self.registry.signatures()
    }

    /// Handles one request. `res` is always written exactly once when this
    /// returns: by the chain, or with an error body.
    pub async fn dispatch(&self, req: &Request, res: &mut Response) {
        res.set_phase(Phase::Dispatched);
        let mut ctx = Context::new();

        let result = match self.registry.lookup(req.method()) {
            Some(unit) => {
                trace!(method = req.method(), "dispatching");
                unit.run(&mut ctx, req, res).await
            }
            None => Err(Error::not_found()),
        };

        if let Err(error) = result {
            self.reject(error, &ctx, req, res);
        }
    }

    /// Reports `error` to the listeners and writes its JSON body.
    ///
    /// If the chain already wrote the response, the listeners still hear
    /// about the failure but nothing more is written.
    pub fn reject(&self, error: Error, ctx: &Context, req: &Request, res: &mut Response) {
        let failed_in = res.phase();
        res.set_phase(Phase::Error);

        {
            let event = ErrorEvent {
                error: &error,
                context: error.context().unwrap_or(ctx),
                request: req,
                response: res,
                phase: failed_in,
            };
            for listener in &self.listeners {
                listener(&event);
            }
        }

        if res.headers_sent() {
            debug!(status = error.status().as_u16(), "response already sent, dropping error body");
            res.set_phase(Phase::Responded);
            return;
        }

        let body = error.to_body();
        res.release();
        let written = res.status(error.status()).json(json!({
            "type": body.kind,
            "message": body.message,
            "status": body.status,
        }));
        if let Err(e) = written {
            warn!("failed to write error response: {e}");
        }
    }
}
