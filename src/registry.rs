//! Method -> [`HandlerUnit`] table.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::handler::{BoxedHandler, Endpoint};
use crate::method::Method;
use crate::unit::HandlerUnit;

/// The bound units, at most one per method.
///
/// Registering a method that is already bound folds the new registration
/// into the old one (see [`HandlerUnit`]'s merge rules) instead of adding a
/// second unit.
#[derive(Debug, Default)]
pub struct Registry {
    units: BTreeMap<Method, HandlerUnit>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `endpoint` to `method`, behind the given middleware snapshot.
    ///
    /// Fails, leaving the table untouched, if a schema does not compile.
    pub fn register(
        &mut self,
        method: Method,
        middlewares: Vec<BoxedHandler>,
        endpoint: Endpoint,
    ) -> Result<(), Error> {
        let unit = HandlerUnit::new(middlewares, endpoint)?;
        let unit = match self.units.remove(&method) {
            Some(earlier) => earlier.merge(unit),
            None => unit,
        };
        self.units.insert(method, unit);
        Ok(())
    }

    /// Finds the unit for a method token, ignoring case.
    pub fn lookup(&self, method: &str) -> Option<&HandlerUnit> {
        let method: Method = method.parse().ok()?;
        self.units.get(&method)
    }

    pub fn get(&self, method: Method) -> Option<&HandlerUnit> {
        self.units.get(&method)
    }

    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.units.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// One [`Signature`] per bound method, in method order.
    pub fn signatures(&self) -> Vec<Signature> {
        self.units
            .iter()
            .map(|(method, unit)| Signature::describe(*method, unit))
            .collect()
    }
}

/// Read-only summary of one bound method, for documentation tooling.
///
/// Only `2xx` response schemas are listed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub method: Method,
    pub method_name: Option<String>,
    pub query: Option<Value>,
    pub body: Option<Value>,
    pub responses: BTreeMap<u16, Value>,
}

impl Signature {
    fn describe(method: Method, unit: &HandlerUnit) -> Self {
        let schema = unit.schema();
        Self {
            method,
            method_name: unit.name().map(str::to_owned),
            query: schema.and_then(|s| s.query.clone()),
            body: schema.and_then(|s| s.body.clone()),
            responses: schema
                .map(|s| {
                    s.response
                        .iter()
                        .filter(|(status, _)| (200..300).contains(*status))
                        .map(|(status, schema)| (*status, schema.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::schema::ValidationSchema;
    use crate::handler::EndpointConfig;
    use serde_json::json;

    fn noop() -> Endpoint {
        Endpoint::new(handler_fn(|_ctx, _req, _res| Box::pin(async move { Ok(Value::Null) })))
    }

    #[test]
    fn lookup_ignores_case_and_unknown_tokens() {
        let mut registry = Registry::new();
        registry.register(Method::Get, vec![], noop()).unwrap();

        assert!(registry.lookup("GET").is_some());
        assert!(registry.lookup("get").is_some());
        assert!(registry.lookup("POST").is_none());
        assert!(registry.lookup("BREW").is_none());
    }

    #[test]
    fn re_registration_merges_into_one_unit() {
        let mut registry = Registry::new();
        registry
            .register(Method::Post, vec![], noop().config(EndpointConfig::new().name("create")))
            .unwrap();
        registry.register(Method::Post, vec![], noop()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(Method::Post).unwrap().name(), Some("create"));
    }

    #[test]
    fn failed_registration_keeps_the_table() {
        let mut registry = Registry::new();
        registry.register(Method::Put, vec![], noop()).unwrap();
        let bad = noop().schema(ValidationSchema::new().body(json!({ "type": "nope" })));
        assert!(registry.register(Method::Put, vec![], bad).is_err());
        assert!(registry.get(Method::Put).is_some());
    }

    #[test]
    fn signatures_list_success_responses_only() {
        let schema = ValidationSchema::new()
            .query(json!({ "type": "object" }))
            .response(200, json!({ "type": "object" }))
            .response(201, json!({ "type": "string" }))
            .response(422, json!({ "type": "object" }));

        let mut registry = Registry::new();
        registry
            .register(
                Method::Get,
                vec![],
                noop().schema(schema).config(EndpointConfig::new().name("list")),
            )
            .unwrap();
        registry.register(Method::Delete, vec![], noop()).unwrap();

        let signatures = registry.signatures();
        assert_eq!(signatures, registry.signatures());

        let value = serde_json::to_value(&signatures).unwrap();
        assert_eq!(
            value,
            json!([
                {
                    "method": "get",
                    "methodName": "list",
                    "query": { "type": "object" },
                    "body": null,
                    "responses": { "200": { "type": "object" }, "201": { "type": "string" } }
                },
                {
                    "method": "delete",
                    "methodName": null,
                    "query": null,
                    "body": null,
                    "responses": {}
                }
            ])
        );
    }
}
