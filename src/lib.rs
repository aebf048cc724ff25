//! # methodic
//!
//! A request-handling core for single-endpoint HTTP services: one handler
//! pipeline per HTTP method, a shared per-request context, and declarative
//! schema validation on the way in and on the way out.
//!
//! ## The contract
//!
//! Path routing is not done here. A [`Router`] serves one logical endpoint
//! (`/users`, say) and multiplexes by method only. Mount one per path behind
//! whatever already routes paths.
//!
//! What a [`Router`] does for every request:
//!
//! - Looks up the pipeline bound to the method (`404` if there is none)
//! - Validates the query and body against their schemas (`400` on failure)
//! - Runs global middleware, endpoint middleware, then the handler(s), in
//!   order, each with the same mutable [`Context`]
//! - Stops the chain as soon as a step writes the [`Response`]
//! - Sanitizes every written payload against the response schema for its
//!   status: coerced, undeclared properties stripped, `500` on failure
//! - Turns every failure into exactly one `{type, message, status}` body and
//!   reports it to the error listeners
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use methodic::{events, handler_fn, middleware, Endpoint, Router, Server, ValidationSchema};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let users = Router::new()
//!         .middleware(middleware::trace())
//!         .on_error(events::log_errors)
//!         .get(handler_fn(|_ctx, _req, _res| Box::pin(async move {
//!             Ok(json!([{ "id": "1", "name": "alice" }]))
//!         })))
//!         .post(
//!             Endpoint::new(handler_fn(|_ctx, req, res| Box::pin(async move {
//!                 res.status(http::StatusCode::CREATED);
//!                 Ok(json!({ "id": "2", "name": req.body()["name"], "password": "hunter2" }))
//!             })))
//!             .schema(
//!                 ValidationSchema::new()
//!                     .body(json!({
//!                         "type": "object",
//!                         "required": ["name"],
//!                         "properties": { "name": { "type": "string" } }
//!                     }))
//!                     // `password` never leaves the server.
//!                     .response(201, json!({
//!                         "type": "object",
//!                         "properties": { "id": { "type": "string" }, "name": { "type": "string" } },
//!                         "additionalProperties": false
//!                     })),
//!             ),
//!         );
//!
//!     Server::bind("0.0.0.0:3000").serve(users).await.unwrap();
//! }
//! ```

mod context;
mod error;
mod handler;
mod method;
mod registry;
mod request;
mod response;
mod router;
mod server;
mod unit;

pub mod events;
pub mod middleware;
pub mod schema;

pub use context::Context;
pub use error::{BoxError, Error, ErrorBody, ErrorKind};
pub use events::{ErrorEvent, ErrorListener};
pub use handler::{BoxFuture, BoxedHandler, Endpoint, EndpointConfig, Handler, Outcome, handler_fn};
pub use method::{Method, UnknownMethod};
pub use registry::{Registry, Signature};
pub use request::Request;
pub use response::{Body, Phase, Response};
pub use router::Router;
pub use schema::{SchemaValidator, ValidationSchema};
pub use server::{Server, serve_listener, shutdown_signal};
pub use unit::HandlerUnit;
