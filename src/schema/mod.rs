//! Declarative payload validation.
//!
//! Three validators exist, one per concern, each with its own policy:
//!
//! | Validator | Coerces scalars | Strips undeclared properties |
//! |---|---|---|
//! | [`SchemaValidator::QUERY`]    | yes | no  |
//! | [`SchemaValidator::BODY`]     | no  | no  |
//! | [`SchemaValidator::RESPONSE`] | yes | yes |
//!
//! Query values always arrive as strings, so the query validator converts
//! `"10"` to `10` when the schema asks for a number. The response validator
//! doubles as a sanitizer: a property the schema does not declare (under
//! `additionalProperties: false`) never reaches the client.
//!
//! Schemas are compiled once, when a handler is registered. Unknown keywords
//! (`kind`, `modifier`, vendor annotations) are carried along and ignored.

mod coerce;
mod message;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── Slot ──────────────────────────────────────────────────────────────────────

/// Which part of the exchange a schema applies to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Slot {
    Query,
    Body,
    Response,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Body     => "body",
            Self::Query    => "query",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ValidationSchema ──────────────────────────────────────────────────────────

/// The optional schemas attached to one endpoint method.
///
/// Every slot is opt-in; an absent slot is never validated. Response schemas
/// are keyed by status code and only apply to writes made with that status.
///
/// ```rust
/// use methodic::ValidationSchema;
/// use serde_json::json;
///
/// let schema = ValidationSchema::new()
///     .query(json!({ "type": "object", "properties": { "limit": { "type": "integer" } } }))
///     .response(200, json!({
///         "type": "object",
///         "properties": { "id": { "type": "string" } },
///         "additionalProperties": false
///     }));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response: BTreeMap<u16, Value>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, schema: Value) -> Self {
        self.query = Some(schema);
        self
    }

    pub fn body(mut self, schema: Value) -> Self {
        self.body = Some(schema);
        self
    }

    pub fn response(mut self, status: u16, schema: Value) -> Self {
        self.response.insert(status, schema);
        self
    }

    /// Compiles every present slot with its validator's policy.
    pub(crate) fn compile(&self) -> Result<CompiledSchemas, Error> {
        let query = self.query.as_ref().map(|s| SchemaValidator::QUERY.compile(s)).transpose()?;
        let body = self.body.as_ref().map(|s| SchemaValidator::BODY.compile(s)).transpose()?;
        let response = self
            .response
            .iter()
            .map(|(status, s)| Ok((*status, SchemaValidator::RESPONSE.compile(s)?)))
            .collect::<Result<BTreeMap<_, _>, Error>>()?;
        Ok(CompiledSchemas { query, body, response })
    }
}

/// A [`ValidationSchema`] with every slot compiled.
pub(crate) struct CompiledSchemas {
    pub(crate) query: Option<CompiledSchema>,
    pub(crate) body: Option<CompiledSchema>,
    pub(crate) response: BTreeMap<u16, CompiledSchema>,
}

// ── SchemaValidator ───────────────────────────────────────────────────────────

/// How a validator treats data before checking it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Policy {
    /// Convert scalars toward the declared `type` (`"1"` -> `1`, `1` -> `"1"`).
    pub coerce_types: bool,
    /// Drop properties not declared where `additionalProperties` is `false`.
    pub remove_additional: bool,
}

/// A validation engine configured for one [`Slot`].
#[derive(Clone, Copy, Debug)]
pub struct SchemaValidator {
    slot: Slot,
    policy: Policy,
}

impl SchemaValidator {
    pub const QUERY: Self = Self {
        slot: Slot::Query,
        policy: Policy { coerce_types: true, remove_additional: false },
    };

    pub const BODY: Self = Self {
        slot: Slot::Body,
        policy: Policy { coerce_types: false, remove_additional: false },
    };

    pub const RESPONSE: Self = Self {
        slot: Slot::Response,
        policy: Policy { coerce_types: true, remove_additional: true },
    };

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Compiles `schema` for repeated checks.
    ///
    /// Fails with a `500` if the schema itself is malformed.
    pub fn compile(&self, schema: &Value) -> Result<CompiledSchema, Error> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| Error::internal(format!("invalid {} schema: {e}", self.slot)))?;
        let active = self.policy.coerce_types || self.policy.remove_additional;
        let branches = if active { coerce::Branches::compile(schema) } else { coerce::Branches::default() };
        Ok(CompiledSchema {
            slot: self.slot,
            policy: self.policy,
            schema: schema.clone(),
            validator,
            branches,
        })
    }

    /// One-shot compile-then-check. Mutates `data` according to the policy.
    pub fn compile_and_check(&self, schema: &Value, data: &mut Value) -> Result<Report, Error> {
        Ok(self.compile(schema)?.check(data))
    }
}

// ── CompiledSchema ────────────────────────────────────────────────────────────

/// A compiled schema bound to the policy of the validator that built it.
pub struct CompiledSchema {
    slot: Slot,
    policy: Policy,
    schema: Value,
    validator: jsonschema::Validator,
    branches: coerce::Branches,
}

impl CompiledSchema {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Applies the policy to `data` in place, then validates it.
    pub fn check(&self, data: &mut Value) -> Report {
        coerce::apply(&self.schema, &self.branches, data, self.policy);
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(data)
            .map(|e| Violation {
                path: e.instance_path().to_string(),
                message: message::describe(&e),
            })
            .collect();
        Report { valid: violations.is_empty(), violations }
    }

    /// Checks a copy of `data`, leaving the caller's value untouched.
    pub(crate) fn verify(&self, data: &Value) -> Result<(), Error> {
        let mut copy = data.clone();
        self.check(&mut copy).into_result(self.slot).map(|_| ())
    }

    /// Checks `data` and hands back the sanitized value.
    pub(crate) fn sanitize(&self, mut data: Value) -> Result<Value, Error> {
        self.check(&mut data).into_result(self.slot)?;
        Ok(data)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("slot", &self.slot)
            .field("policy", &self.policy)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// One failing location: a JSON pointer into the data and what is wrong there.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

/// Outcome of a single check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Report {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

impl Report {
    /// Maps a failed report to the error its slot raises: `400` for query and
    /// body, `500` for responses.
    pub fn into_result(self, slot: Slot) -> Result<Self, Error> {
        if self.valid {
            return Ok(self);
        }
        Err(match slot {
            Slot::Response => Error::invalid_output(&self.violations),
            input => Error::invalid_input(input, &self.violations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use http::StatusCode;
    use serde_json::json;

    fn requires_foo() -> Value {
        json!({
            "type": "object",
            "properties": { "foo": { "type": "string" } },
            "required": ["foo"]
        })
    }

    #[test]
    fn missing_body_property() {
        let mut data = json!({});
        let report = SchemaValidator::BODY.compile_and_check(&requires_foo(), &mut data).unwrap();
        assert!(!report.valid);

        let err = report.into_result(Slot::Body).unwrap_err();
        assert_eq!(err.message(), "'body' must have required property 'foo'");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), ErrorKind::InvalidInput(Slot::Body));
    }

    #[test]
    fn missing_query_property() {
        let compiled = SchemaValidator::QUERY.compile(&requires_foo()).unwrap();
        let err = compiled.verify(&json!({})).unwrap_err();
        assert_eq!(err.message(), "'query' must have required property 'foo'");
    }

    #[test]
    fn query_coerces_but_body_does_not() {
        let schema = json!({
            "type": "object",
            "properties": { "limit": { "type": "integer" }, "draft": { "type": "boolean" } }
        });

        let mut query = json!({ "limit": "10", "draft": "false" });
        assert!(SchemaValidator::QUERY.compile_and_check(&schema, &mut query).unwrap().valid);
        assert_eq!(query, json!({ "limit": 10, "draft": false }));

        let mut body = json!({ "limit": "10" });
        let report = SchemaValidator::BODY.compile_and_check(&schema, &mut body).unwrap();
        assert_eq!(
            report.violations,
            vec![Violation { path: "/limit".into(), message: "must be integer".into() }]
        );
        assert_eq!(body, json!({ "limit": "10" }));
    }

    #[test]
    fn verify_leaves_input_untouched() {
        let schema = json!({ "type": "object", "properties": { "n": { "type": "number" } } });
        let compiled = SchemaValidator::QUERY.compile(&schema).unwrap();
        let query = json!({ "n": "3" });
        compiled.verify(&query).unwrap();
        assert_eq!(query, json!({ "n": "3" }));
    }

    #[test]
    fn response_is_coerced_and_stripped() {
        let schema = json!({
            "type": "object",
            "properties": { "foo": { "type": "string" } },
            "required": ["foo"],
            "additionalProperties": false
        });
        let compiled = SchemaValidator::RESPONSE.compile(&schema).unwrap();
        let sanitized = compiled.sanitize(json!({ "foo": 1, "bar": "private property" })).unwrap();
        assert_eq!(sanitized, json!({ "foo": "1" }));
    }

    #[test]
    fn response_follows_refs_and_branches() {
        let schema = json!({
            "type": "object",
            "properties": {
                "owner": { "$ref": "#/$defs/user" },
                "id": { "oneOf": [{ "type": "integer" }, { "type": "null" }] }
            },
            "additionalProperties": false,
            "$defs": {
                "user": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "additionalProperties": false
                }
            }
        });
        let compiled = SchemaValidator::RESPONSE.compile(&schema).unwrap();
        let sanitized = compiled
            .sanitize(json!({ "id": "7", "owner": { "name": 1, "token": "t" }, "debug": true }))
            .unwrap();
        assert_eq!(sanitized, json!({ "id": 7, "owner": { "name": "1" } }));
    }

    #[test]
    fn response_failure_is_a_server_error() {
        let compiled = SchemaValidator::RESPONSE.compile(&requires_foo()).unwrap();
        let err = compiled.sanitize(json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "'response' must have required property 'foo'");
    }

    #[test]
    fn every_violation_is_reported() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "integer" } },
            "required": ["a", "b"]
        });
        let mut data = json!({ "b": "x" });
        let report = SchemaValidator::BODY.compile_and_check(&schema, &mut data).unwrap();
        let mut messages: Vec<_> = report
            .violations
            .iter()
            .map(|v| format!("{} {}", v.path, v.message))
            .collect();
        messages.sort();
        assert_eq!(messages, vec![" must have required property 'a'", "/b must be integer"]);
    }

    #[test]
    fn annotation_keywords_are_inert() {
        let schema = json!({ "type": "string", "kind": "identifier", "modifier": "readonly" });
        let mut data = json!("abc");
        assert!(SchemaValidator::BODY.compile_and_check(&schema, &mut data).unwrap().valid);
    }

    #[test]
    fn malformed_schema_fails_to_compile() {
        let err = SchemaValidator::BODY.compile(&json!({ "type": 12 })).unwrap_err();
        assert!(err.message().starts_with("invalid body schema"));
    }

    #[test]
    fn schemas_deserialize_with_status_keys() {
        let schema: ValidationSchema = serde_json::from_value(json!({
            "body": { "type": "object" },
            "response": { "200": { "type": "object" }, "422": { "type": "object" } }
        }))
        .unwrap();
        assert!(schema.query.is_none());
        assert_eq!(schema.response.keys().copied().collect::<Vec<_>>(), vec![200, 422]);
    }
}
