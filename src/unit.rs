//! The pipeline bound to one HTTP method.
//!
//! A [`HandlerUnit`] runs, in order:
//!
//! 1. query validation, then body validation (check-only; `400` on failure)
//! 2. context seeding from the endpoint's static defaults
//! 3. middleware, then handlers, each awaited before the next starts
//! 4. the fallback write of the last return value if nothing was written
//!
//! Every write made along the way passes through the response schema for its
//! status. Any failure carries the request's context when it leaves `run`.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxedHandler, Endpoint, EndpointConfig};
use crate::request::Request;
use crate::response::{Phase, Response};
use crate::schema::{CompiledSchema, ValidationSchema};

/// A method's middleware, handlers, schemas and static config.
pub struct HandlerUnit {
    middlewares: Vec<BoxedHandler>,
    handlers: Vec<BoxedHandler>,
    schema: Option<BoundSchema>,
    config: Option<EndpointConfig>,
}

/// A [`ValidationSchema`] next to its compiled slots.
struct BoundSchema {
    source: ValidationSchema,
    query: Option<CompiledSchema>,
    body: Option<CompiledSchema>,
    responses: Arc<BTreeMap<u16, CompiledSchema>>,
}

impl HandlerUnit {
    /// Builds a unit from the router's middleware snapshot and an endpoint.
    ///
    /// Fails if any schema slot does not compile.
    pub fn new(middlewares: Vec<BoxedHandler>, endpoint: Endpoint) -> Result<Self, Error> {
        let Endpoint { middlewares: own, handlers, schema, config } = endpoint;

        let schema = schema
            .map(|source| {
                let compiled = source.compile()?;
                Ok::<_, Error>(BoundSchema {
                    source,
                    query: compiled.query,
                    body: compiled.body,
                    responses: Arc::new(compiled.response),
                })
            })
            .transpose()?;

        let mut chain = middlewares;
        chain.extend(own);
        Ok(Self { middlewares: chain, handlers, schema, config })
    }

    /// Folds a later registration for the same method into this one.
    ///
    /// Each field is taken from `later` when it has one: the middleware and
    /// handler lists always, the schema and config only when set. Schemas are
    /// replaced whole, never merged slot by slot.
    pub(crate) fn merge(self, later: Self) -> Self {
        Self {
            middlewares: later.middlewares,
            handlers: later.handlers,
            schema: later.schema.or(self.schema),
            config: later.config.or(self.config),
        }
    }

    pub fn schema(&self) -> Option<&ValidationSchema> {
        self.schema.as_ref().map(|s| &s.source)
    }

    pub fn config(&self) -> Option<&EndpointConfig> {
        self.config.as_ref()
    }

    /// The configured method name, if any.
    pub fn name(&self) -> Option<&str> {
        self.config.as_ref().and_then(|c| c.name.as_deref())
    }

    /// Number of middleware steps, global snapshot included.
    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Runs the pipeline for one request.
    ///
    /// On failure the returned error carries a snapshot of `ctx` as it was
    /// when the failure happened.
    pub async fn run(&self, ctx: &mut Context, req: &Request, res: &mut Response) -> Result<(), Error> {
        let result = self.execute(ctx, req, res).await;
        result.map_err(|e| e.with_context(ctx.clone()))
    }

    async fn execute(&self, ctx: &mut Context, req: &Request, res: &mut Response) -> Result<(), Error> {
        if let Some(schema) = &self.schema {
            res.set_phase(Phase::ValidatingInput);
            if let Some(query) = &schema.query {
                query.verify(req.query())?;
            }
            if let Some(body) = &schema.body {
                body.verify(req.body())?;
            }
            if !schema.responses.is_empty() {
                res.intercept(Arc::clone(&schema.responses));
            }
        }

        if let Some(config) = &self.config {
            ctx.seed(&config.defaults);
        }

        res.set_phase(Phase::RunningChain);

        let mut last = Value::Null;
        for (index, step) in self.middlewares.iter().chain(&self.handlers).enumerate() {
            if res.headers_sent() {
                debug!(step = index, "response already sent, skipping remaining steps");
                break;
            }
            trace!(step = index, "running step");
            last = AssertUnwindSafe(step.call(ctx, req, res))
                .catch_unwind()
                .await
                .map_err(Error::from_panic)??;
        }

        if res.headers_sent() {
            return Ok(());
        }
        res.write_return(last)
    }
}

impl fmt::Debug for HandlerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerUnit")
            .field("middlewares", &self.middlewares.len())
            .field("handlers", &self.handlers.len())
            .field("schema", &self.schema())
            .field("config", &self.config)
            .finish()
    }
}
