//! Incoming request type.
//!
//! By the time a handler sees a [`Request`], the query string and body are
//! already decoded into JSON values. The method is kept as the raw token so
//! that an unbindable method can still be reported as `404`.

use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde_json::{Map, Value};

use crate::error::Error;

/// An incoming HTTP request.
///
/// Built by the [`Server`](crate::Server) from the wire, or by hand in tests:
///
/// ```rust
/// use methodic::Request;
/// use serde_json::json;
///
/// let req = Request::new("POST")
///     .with_query_string("page=2&tag=a&tag=b")
///     .with_body(json!({ "name": "alice" }));
///
/// assert_eq!(req.query_param("page"), Some("2"));
/// assert_eq!(req.query()["tag"], json!(["a", "b"]));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) query: Value,
    pub(crate) body: Value,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: "/".to_owned(),
            headers: HeaderMap::new(),
            query: Value::Object(Map::new()),
            body: Value::Null,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces the decoded query with `query` (normally a JSON object of strings).
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    /// Decodes a raw `a=1&b=2` query string.
    pub fn with_query_string(mut self, raw: &str) -> Self {
        self.query = parse_query(raw);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// The method token exactly as received.
    pub fn method(&self) -> &str { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn query(&self) -> &Value { &self.query }
    pub fn body(&self) -> &Value { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A single-valued query parameter. For repeated keys, the first value.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        match self.query.get(key)? {
            Value::String(s) => Some(s),
            Value::Array(values) => values.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Decodes an `application/x-www-form-urlencoded` string into an object of
/// strings. A key seen more than once becomes an array, in order.
pub(crate) fn parse_query(raw: &str) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            None => {
                map.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(map)
}

/// Decodes a request body according to its content type.
///
/// JSON bodies are parsed, form bodies become objects, anything else is kept
/// as UTF-8 text. An empty body is `null`.
pub(crate) fn parse_body(headers: &HeaderMap, bytes: &[u8]) -> Result<Value, Error> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default();

    if content_type == "application/json" || content_type.ends_with("+json") {
        return serde_json::from_slice(bytes)
            .map_err(|_| Error::new(StatusCode::BAD_REQUEST, "invalid JSON body"));
    }

    let text = String::from_utf8_lossy(bytes);
    if content_type == "application/x-www-form-urlencoded" {
        return Ok(parse_query(&text));
    }
    Ok(Value::String(text.into_owned()))
}
