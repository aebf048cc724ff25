//! Minimal methodic example — one `/users` endpoint with validation.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/?limit=2'
//!   curl -X POST http://localhost:3000/ \
//!        -H 'content-type: application/json' -H 'x-api-key: demo' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/ -H 'x-api-key: demo' \
//!        -H 'content-type: application/json' -d '{}'        # 400
//!   curl -X DELETE http://localhost:3000/                     # 404
//!   curl -X OPTIONS http://localhost:3000/                    # signatures

use std::sync::Arc;

use http::StatusCode;
use methodic::{
    events, handler_fn, middleware, BoxFuture, Context, Endpoint, EndpointConfig, Outcome,
    Request, Response, Router, Server, Signature, ValidationSchema,
};
use serde_json::{json, Value};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let signatures: Arc<std::sync::OnceLock<Vec<Signature>>> = Arc::default();
    let published = Arc::clone(&signatures);

    let app = Router::new()
        .middleware(middleware::trace())
        .on_error(events::log_errors)
        .get(
            Endpoint::new(list_users)
                .schema(ValidationSchema::new().query(json!({
                    "type": "object",
                    "properties": { "limit": { "type": "integer", "minimum": 1 } }
                })))
                .config(EndpointConfig::new().name("listUsers").default_value("limit", 10)),
        )
        .post(
            Endpoint::new(create_user)
                .middleware(middleware::require_header("x-api-key"))
                .schema(
                    ValidationSchema::new()
                        .body(json!({
                            "type": "object",
                            "required": ["name"],
                            "properties": { "name": { "type": "string", "minLength": 1 } }
                        }))
                        .response(201, json!({
                            "type": "object",
                            "properties": { "id": { "type": "string" }, "name": { "type": "string" } },
                            "additionalProperties": false
                        })),
                )
                .config(EndpointConfig::new().name("createUser")),
        )
        .options(handler_fn(move |_ctx, _req, _res| {
            let signatures = Arc::clone(&published);
            Box::pin(async move { Ok(serde_json::to_value(signatures.get())?) })
        }));

    let _ = signatures.set(app.signatures());

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /: `limit` arrives as a string; the query schema checks it as an integer.
fn list_users<'a>(ctx: &'a mut Context, req: &'a Request, _res: &'a mut Response) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let limit = req
            .query_param("limit")
            .and_then(|l| l.parse::<usize>().ok())
            .or_else(|| ctx.get_as("limit"))
            .unwrap_or(10);
        let users: Vec<Value> = ["alice", "bob", "carol"]
            .iter()
            .enumerate()
            .take(limit)
            .map(|(i, name)| json!({ "id": (i + 1).to_string(), "name": name }))
            .collect();
        Ok(Value::Array(users))
    })
}

// POST /: the stored record carries an internal field the response schema strips.
fn create_user<'a>(ctx: &'a mut Context, req: &'a Request, res: &'a mut Response) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let owner = ctx.get("x-api-key").cloned().unwrap_or_default();
        res.status(StatusCode::CREATED).header("location", "/99");
        Ok(json!({ "id": "99", "name": req.body()["name"], "owner": owner }))
    })
}
