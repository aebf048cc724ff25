//! Chain elements and the endpoint description they are registered with.
//!
//! # How chain elements are stored
//!
//! A method's pipeline holds middleware and handlers of *different* concrete
//! types in one `Vec`, so each element is type-erased behind
//! `Arc<dyn Handler>`. Every element has the same shape:
//!
//! ```text
//! |ctx: &mut Context, req: &Request, res: &mut Response| -> BoxFuture<Outcome>
//! ```
//!
//! Middleware and terminal handlers are the same thing. The only difference
//! is where they sit in the chain.
//!
//! ```text
//! handler_fn(|ctx, req, res| Box::pin(async move { … }))   ← user writes this
//!        ↓ router.post(…)
//! Endpoint { handlers: [Arc<dyn Handler>], … }             ← From<impl Handler>
//!        ↓ Registry::register
//! HandlerUnit { middlewares, handlers, schemas, config }   ← compiled once
//!        ↓ at request time
//! step.call(&mut ctx, &req, &mut res).await                ← one vtable call per step
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::schema::ValidationSchema;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future borrowing from the request for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a chain element resolves to.
///
/// `Ok(Value::Null)` means "returned nothing". The last element's value is
/// written to the response if no element wrote one explicitly.
pub type Outcome = Result<Value, Error>;

/// A type-erased chain element shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

// ── Handler trait ─────────────────────────────────────────────────────────────

/// One step of a method's pipeline: a middleware or a terminal handler.
///
/// Implemented automatically for any function or closure with the signature
/// below. Wrap closures in [`handler_fn`] so their argument types are
/// inferred:
///
/// ```rust
/// use methodic::{handler_fn, Context, Request, Response, BoxFuture, Outcome};
/// use serde_json::json;
///
/// let auth = handler_fn(|ctx, _req, _res| Box::pin(async move {
///     ctx.insert("user", json!({ "name": "John Doe" }));
///     Ok(json!(null))
/// }));
///
/// fn whoami<'a>(ctx: &'a mut Context, _: &'a Request, _: &'a mut Response) -> BoxFuture<'a, Outcome> {
///     Box::pin(async move { Ok(ctx.get("user").cloned().unwrap_or_default()) })
/// }
/// ```
///
/// Implement it on a struct when the element carries its own configuration,
/// as the built-ins in [`middleware`](crate::middleware) do.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        ctx: &'a mut Context,
        req: &'a Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context, &'a Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut Context,
        req: &'a Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome> {
        self(ctx, req, res)
    }
}

/// Pins a closure to the [`Handler`] signature.
///
/// Closures passed straight to a generic parameter cannot infer higher-ranked
/// argument types; going through this identity function gives the compiler
/// the signature up front.
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Context, &'a Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    f
}

// ── EndpointConfig ────────────────────────────────────────────────────────────

/// Static configuration attached to one method.
///
/// `defaults` are cloned into every request's [`Context`] before the chain
/// runs, so a chain element can mutate its copy freely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Reported as `methodName` in signatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// Everything registered for one method: a bare handler, or a handler with
/// its own middleware, schema and config.
///
/// ```rust
/// use methodic::{handler_fn, Endpoint, EndpointConfig, ValidationSchema};
/// use serde_json::json;
///
/// let create = Endpoint::new(handler_fn(|_ctx, req, _res| Box::pin(async move {
///     Ok(req.body().clone())
/// })))
/// .schema(ValidationSchema::new().body(json!({ "type": "object", "required": ["name"] })))
/// .config(EndpointConfig::new().name("createUser"));
/// ```
pub struct Endpoint {
    pub(crate) middlewares: Vec<BoxedHandler>,
    pub(crate) handlers: Vec<BoxedHandler>,
    pub(crate) schema: Option<ValidationSchema>,
    pub(crate) config: Option<EndpointConfig>,
}

impl Endpoint {
    pub fn new(handler: impl Handler) -> Self {
        Self {
            middlewares: Vec::new(),
            handlers: vec![Arc::new(handler)],
            schema: None,
            config: None,
        }
    }

    /// Appends another terminal handler. Handlers run in order, with the same
    /// short-circuit rule as middleware.
    pub fn then(mut self, handler: impl Handler) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Appends middleware that runs after the router's global middleware.
    pub fn middleware(mut self, middleware: impl Handler) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn schema(mut self, schema: ValidationSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = Some(config);
        self
    }
}

impl<H: Handler> From<H> for Endpoint {
    fn from(handler: H) -> Self {
        Self::new(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo<'a>(_: &'a mut Context, req: &'a Request, _: &'a mut Response) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { Ok(req.body().clone()) })
    }

    #[tokio::test]
    async fn named_functions_are_handlers() {
        let handler: BoxedHandler = Arc::new(echo);
        let req = Request::new("POST").with_body(json!({ "a": 1 }));
        let mut ctx = Context::new();
        let mut res = Response::new();
        assert_eq!(handler.call(&mut ctx, &req, &mut res).await.unwrap(), json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn closures_mutate_the_context() {
        let handler = handler_fn(|ctx, _req, _res| {
            Box::pin(async move {
                ctx.insert("seen", true);
                Ok(Value::Null)
            })
        });
        let mut ctx = Context::new();
        Handler::call(&handler, &mut ctx, &Request::new("GET"), &mut Response::new()).await.unwrap();
        assert_eq!(ctx.get("seen"), Some(&json!(true)));
    }

    #[test]
    fn endpoint_collects_steps_in_order() {
        let endpoint = Endpoint::from(echo)
            .then(echo)
            .middleware(echo)
            .config(EndpointConfig::new().name("echo").default_value("page", 1));

        assert_eq!(endpoint.handlers.len(), 2);
        assert_eq!(endpoint.middlewares.len(), 1);
        assert!(endpoint.schema.is_none());
        let config = endpoint.config.unwrap();
        assert_eq!(config.name.as_deref(), Some("echo"));
        assert_eq!(config.defaults["page"], json!(1));
    }

    #[test]
    fn config_deserializes() {
        let config: EndpointConfig =
            serde_json::from_value(json!({ "name": "list", "defaults": { "limit": 20 } })).unwrap();
        assert_eq!(config, EndpointConfig::new().name("list").default_value("limit", 20));
    }
}
