//! Outgoing response type.
//!
//! A [`Response`] is written at most once. Chain elements either write it
//! explicitly (`json`, `send`, `end`), which short-circuits the rest of the
//! chain, or leave it to the pipeline to write their return value.
//!
//! When the method declares a response schema for the current status, every
//! payload written is coerced and stripped of undeclared properties before
//! it is stored. What the client receives is always the sanitized copy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde_json::Value;

use crate::error::Error;
use crate::schema::CompiledSchema;

// ── Phase ─────────────────────────────────────────────────────────────────────

/// Where a request is in its lifecycle.
///
/// ```text
/// Dispatched -> ValidatingInput -> RunningChain -> ValidatingOutput -> Responded
///      \______________\_________________\________________\__> Error -> Responded
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Phase {
    #[default]
    Dispatched,
    ValidatingInput,
    RunningChain,
    ValidatingOutput,
    Responded,
    Error,
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// The payload of a written response.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Text(String),
}

// ── Response ──────────────────────────────────────────────────────────────────

/// An outgoing HTTP response, shared mutably by every step of the chain.
///
/// ```rust
/// use methodic::{Body, Response};
/// use http::StatusCode;
/// use serde_json::json;
///
/// let mut res = Response::new();
/// res.status(StatusCode::CREATED).json(json!({ "id": 42 })).unwrap();
///
/// assert!(res.headers_sent());
/// assert_eq!(res.body(), &Body::Json(json!({ "id": 42 })));
///
/// // The first write stands.
/// assert!(res.json(json!({ "id": 43 })).is_err());
/// ```
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    sent: bool,
    phase: Phase,
    schemas: Option<Arc<BTreeMap<u16, CompiledSchema>>>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Body::Empty,
            sent: false,
            phase: Phase::Dispatched,
            schemas: None,
        }
    }

    /// Sets the status used by the next write.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a header. Invalid names or values are skipped.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Writes `value` as a JSON body.
    pub fn json(&mut self, value: impl Into<Value>) -> Result<(), Error> {
        let value = self.filter(value.into())?;
        self.commit(Body::Json(value))
    }

    /// Writes `value`: strings as `text/plain`, everything else as JSON.
    pub fn send(&mut self, value: impl Into<Value>) -> Result<(), Error> {
        match self.filter(value.into())? {
            Value::String(text) => self.commit(Body::Text(text)),
            other => self.commit(Body::Json(other)),
        }
    }

    /// Marks the response sent with no body.
    pub fn end(&mut self) -> Result<(), Error> {
        self.commit(Body::Empty)
    }

    /// Whether a write has already happened.
    pub fn headers_sent(&self) -> bool {
        self.sent
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Installs the response schemas every later write passes through.
    pub(crate) fn intercept(&mut self, schemas: Arc<BTreeMap<u16, CompiledSchema>>) {
        self.schemas = Some(schemas);
    }

    /// Removes the response schemas; error bodies are written unfiltered.
    pub(crate) fn release(&mut self) {
        self.schemas = None;
    }

    /// Writes a chain's return value. `null` ends the response with no body,
    /// unless a response schema covers the current status: then it is
    /// checked like any other payload.
    pub(crate) fn write_return(&mut self, value: Value) -> Result<(), Error> {
        let checked = self.schemas.as_ref().is_some_and(|s| s.contains_key(&self.status.as_u16()));
        if value.is_null() && !checked {
            return self.end();
        }
        self.json(value)
    }

    fn filter(&mut self, value: Value) -> Result<Value, Error> {
        if self.sent {
            return Err(already_sent());
        }
        let Some(schema) = self.schemas.as_ref().and_then(|s| s.get(&self.status.as_u16())) else {
            return Ok(value);
        };
        self.phase = Phase::ValidatingOutput;
        schema.sanitize(value)
    }

    fn commit(&mut self, body: Body) -> Result<(), Error> {
        if self.sent {
            return Err(already_sent());
        }
        self.body = body;
        self.sent = true;
        self.phase = Phase::Responded;
        Ok(())
    }

    /// Converts into the hyper response type. Unsent responses go out empty.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let (content_type, bytes) = match self.body {
            Body::Empty => (None, Bytes::new()),
            Body::Json(value) => (
                Some("application/json"),
                Bytes::from(serde_json::to_vec(&value).unwrap_or_default()),
            ),
            Body::Text(text) => (Some("text/plain; charset=utf-8"), Bytes::from(text)),
        };

        let mut out = http::Response::new(Full::new(bytes));
        *out.status_mut() = self.status;
        *out.headers_mut() = self.headers;
        if let Some(content_type) = content_type {
            out.headers_mut()
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_type));
        }
        out
    }
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("sent", &self.sent)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

fn already_sent() -> Error {
    Error::internal("response already sent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::SchemaValidator;
    use serde_json::json;

    fn with_schema(status: u16, schema: Value) -> Response {
        let compiled = SchemaValidator::RESPONSE.compile(&schema).unwrap();
        let mut res = Response::new();
        res.intercept(Arc::new(BTreeMap::from([(status, compiled)])));
        res
    }

    fn strict_foo() -> Value {
        json!({
            "type": "object",
            "properties": { "foo": { "type": "string" } },
            "required": ["foo"],
            "additionalProperties": false
        })
    }

    #[test]
    fn writes_are_single_shot() {
        let mut res = Response::new();
        res.send("hello").unwrap();
        assert_eq!(res.body(), &Body::Text("hello".into()));
        assert_eq!(res.phase(), Phase::Responded);

        let err = res.end().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unhandled);
        assert_eq!(res.body(), &Body::Text("hello".into()));
    }

    #[test]
    fn payload_is_sanitized_for_matching_status() {
        let mut res = with_schema(200, strict_foo());
        res.json(json!({ "foo": 1, "bar": "private property" })).unwrap();
        assert_eq!(res.body(), &Body::Json(json!({ "foo": "1" })));
    }

    #[test]
    fn other_statuses_pass_through() {
        let mut res = with_schema(200, strict_foo());
        res.status(StatusCode::ACCEPTED).json(json!({ "bar": 1 })).unwrap();
        assert_eq!(res.body(), &Body::Json(json!({ "bar": 1 })));
    }

    #[test]
    fn rejected_payload_leaves_response_unsent() {
        let mut res = with_schema(200, strict_foo());
        let err = res.json(json!({ "bar": 1 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
        assert!(!res.headers_sent());
        assert_eq!(res.phase(), Phase::ValidatingOutput);

        res.release();
        res.json(json!({ "bar": 1 })).unwrap();
        assert!(res.headers_sent());
    }

    #[test]
    fn null_return_is_checked_when_a_schema_applies() {
        let mut res = with_schema(200, strict_foo());
        let err = res.write_return(Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
        assert!(!res.headers_sent());

        let mut res = with_schema(201, strict_foo());
        res.write_return(Value::Null).unwrap();
        assert_eq!(res.body(), &Body::Empty);

        let mut res = with_schema(200, json!({ "type": ["object", "null"] }));
        res.write_return(Value::Null).unwrap();
        assert_eq!(res.body(), &Body::Json(Value::Null));
    }

    #[test]
    fn into_http_sets_content_type() {
        let mut res = Response::new();
        res.status(StatusCode::CREATED).json(json!({ "id": 1 })).unwrap();
        let out = res.into_http();
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(out.headers()[CONTENT_TYPE], "application/json");

        let mut res = Response::new();
        res.header("content-type", "application/problem+json").json(json!({})).unwrap();
        assert_eq!(res.into_http().headers()[CONTENT_TYPE], "application/problem+json");
    }
}
