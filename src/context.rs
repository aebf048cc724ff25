//! Per-request execution context.
//!
//! One [`Context`] is created for every dispatched request and handed by
//! mutable reference to each middleware and handler in turn. Step N writes,
//! step N+1 reads. It is dropped when the request completes and is never
//! reachable from another request.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A string-keyed bag of JSON values shared along one request's chain.
///
/// ```rust
/// use methodic::Context;
/// use serde_json::json;
///
/// let mut ctx = Context::new();
/// ctx.insert("user", json!({ "name": "John Doe" }));
/// assert_eq!(ctx.get("user").unwrap()["name"], "John Doe");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Deserializes the value under `key` into `T`.
    ///
    /// Returns `None` when the key is absent or the value has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| T::deserialize(v).ok())
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copies every entry of `defaults` into the context, overwriting keys
    /// that already exist. The template is cloned, never borrowed.
    pub(crate) fn seed(&mut self, defaults: &Map<String, Value>) {
        for (key, value) in defaults {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
