//! In-place type coercion and removal of undeclared properties.
//!
//! Runs before the validator sees the data. The walk follows `properties`,
//! `additionalProperties` (schema form), `items`, `prefixItems`, `allOf` and
//! local `$ref` pointers (`#/$defs/...`). For `anyOf` and `oneOf`, the first
//! branch that validates once walked wins; it is tried on a copy, so a branch
//! that fails leaves no trace. `if`/`then`/`else` and remote references are
//! left to the validator.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Number, Value};

use super::Policy;

// Cuts off `$ref` cycles that never descend into the data.
const MAX_REF_HOPS: u8 = 32;

/// Validators for every `anyOf` / `oneOf` branch of a schema, keyed by the
/// branch's JSON pointer.
#[derive(Default)]
pub(super) struct Branches(HashMap<String, jsonschema::Validator>);

impl Branches {
    pub(super) fn compile(root: &Value) -> Self {
        let mut branches = HashMap::new();
        scan(root, root, String::new(), false, &mut branches);
        Self(branches)
    }
}

// `names` marks maps keyed by property or definition names, whose entries
// are all subschemas.
fn scan(root: &Value, node: &Value, at: String, names: bool, out: &mut HashMap<String, jsonschema::Validator>) {
    match node {
        Value::Object(map) => {
            for keyword in ["anyOf", "oneOf"] {
                let Some(Value::Array(branches)) = map.get(keyword).filter(|_| !names) else { continue };
                for (i, branch) in branches.iter().enumerate() {
                    if let Some(validator) = branch_validator(root, branch) {
                        out.insert(format!("{at}/{keyword}/{i}"), validator);
                    }
                }
            }
            for (key, value) in map {
                let key = key.as_str();
                // Literal data, not subschemas.
                if !names && matches!(key, "const" | "default" | "enum" | "examples") {
                    continue;
                }
                let holds_names = !names
                    && matches!(key, "$defs" | "definitions" | "dependentSchemas" | "patternProperties" | "properties");
                scan(root, value, format!("{at}/{}", escape(key)), holds_names, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan(root, item, format!("{at}/{i}"), false, out);
            }
        }
        _ => {}
    }
}

// The branch alone, with the root's definitions so local refs still resolve.
// Branches that cannot compile this way never match.
fn branch_validator(root: &Value, branch: &Value) -> Option<jsonschema::Validator> {
    let mut wrapper = Map::new();
    if let Value::Object(root) = root {
        for keyword in ["$schema", "$defs", "definitions"] {
            if let Some(value) = root.get(keyword) {
                wrapper.insert(keyword.to_owned(), value.clone());
            }
        }
    }
    wrapper.insert("allOf".to_owned(), Value::Array(vec![branch.clone()]));
    jsonschema::options()
        .should_validate_formats(true)
        .build(&Value::Object(wrapper))
        .ok()
}

pub(super) fn apply(root: &Value, branches: &Branches, data: &mut Value, policy: Policy) {
    if policy.coerce_types || policy.remove_additional {
        Walker { root, branches, policy }.walk(root, "", data, 0);
    }
}

struct Walker<'s> {
    root: &'s Value,
    branches: &'s Branches,
    policy: Policy,
}

impl<'s> Walker<'s> {
    /// `at` is the schema's JSON pointer within the root; `hops` counts the
    /// `$ref`s followed since the walk last moved into the data.
    fn walk(&self, schema: &'s Value, at: &str, data: &mut Value, hops: u8) {
        // `true` / `false` schemas carry nothing to act on.
        let Value::Object(schema) = schema else { return };

        if let Some(Value::String(reference)) = schema.get("$ref") {
            if let Some((target, location)) = self.resolve(reference) {
                if hops < MAX_REF_HOPS {
                    self.walk(target, location, data, hops + 1);
                }
            }
        }

        if self.policy.coerce_types {
            if let Some(types) = schema.get("type") {
                coerce(types, data);
            }
        }

        if let Some(Value::Array(all)) = schema.get("allOf") {
            for (i, sub) in all.iter().enumerate() {
                self.walk(sub, &format!("{at}/allOf/{i}"), data, hops);
            }
        }

        for keyword in ["anyOf", "oneOf"] {
            if let Some(Value::Array(branches)) = schema.get(keyword) {
                self.first_match(branches, &format!("{at}/{keyword}"), data, hops);
            }
        }

        match data {
            Value::Object(map) => self.walk_object(schema, at, map),
            Value::Array(items) => self.walk_array(schema, at, items),
            _ => {}
        }
    }

    // `#` alone is the root; anything else must be a JSON pointer into it.
    fn resolve(&self, reference: &'s str) -> Option<(&'s Value, &'s str)> {
        let pointer = reference.strip_prefix('#')?;
        Some((self.root.pointer(pointer)?, pointer))
    }

    fn first_match(&self, branches: &'s [Value], at: &str, data: &mut Value, hops: u8) {
        for (i, branch) in branches.iter().enumerate() {
            let at = format!("{at}/{i}");
            let Some(validator) = self.branches.0.get(&at) else { continue };
            let mut candidate = data.clone();
            self.walk(branch, &at, &mut candidate, hops);
            if validator.is_valid(&candidate) {
                *data = candidate;
                return;
            }
        }
    }

    fn walk_object(&self, schema: &'s Map<String, Value>, at: &str, map: &mut Map<String, Value>) {
        let properties = schema.get("properties").and_then(Value::as_object);
        let declared = |key: &str| properties.is_some_and(|p| p.contains_key(key));

        if self.policy.remove_additional && schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            let patterns = pattern_properties(schema);
            map.retain(|key, _| declared(key) || patterns.iter().any(|re| re.is_match(key)));
        }

        if let Some(properties) = properties {
            for (key, sub) in properties {
                if let Some(value) = map.get_mut(key) {
                    self.walk(sub, &format!("{at}/properties/{}", escape(key)), value, 0);
                }
            }
        }

        if let Some(extra @ Value::Object(_)) = schema.get("additionalProperties") {
            let at = format!("{at}/additionalProperties");
            for (key, value) in map.iter_mut() {
                if !declared(key) {
                    self.walk(extra, &at, value, 0);
                }
            }
        }
    }

    fn walk_array(&self, schema: &'s Map<String, Value>, at: &str, items: &mut [Value]) {
        let mut rest = 0;

        // Draft 2020-12 tuples.
        if let Some(Value::Array(prefix)) = schema.get("prefixItems") {
            for (i, (sub, item)) in prefix.iter().zip(items.iter_mut()).enumerate() {
                self.walk(sub, &format!("{at}/prefixItems/{i}"), item, 0);
            }
            rest = prefix.len();
        }

        match schema.get("items") {
            // Pre-2020 tuple form.
            Some(Value::Array(tuple)) => {
                for (i, (sub, item)) in tuple.iter().zip(items.iter_mut()).enumerate() {
                    self.walk(sub, &format!("{at}/items/{i}"), item, 0);
                }
            }
            Some(sub @ Value::Object(_)) => {
                let at = format!("{at}/items");
                for item in items.iter_mut().skip(rest) {
                    self.walk(sub, &at, item, 0);
                }
            }
            _ => {}
        }
    }
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn pattern_properties(schema: &Map<String, Value>) -> Vec<Regex> {
    schema
        .get("patternProperties")
        .and_then(Value::as_object)
        .map(|patterns| patterns.keys().filter_map(|p| Regex::new(p).ok()).collect())
        .unwrap_or_default()
}

/// Converts `data` toward the first declared type it can reach, unless it
/// already satisfies one of them.
fn coerce(types: &Value, data: &mut Value) {
    let declared: Vec<&str> = match types {
        Value::String(t) => vec![t.as_str()],
        Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return,
    };

    if declared.iter().any(|t| satisfies(t, data)) {
        return;
    }

    if let Some(converted) = declared.iter().find_map(|t| convert(t, data)) {
        *data = converted;
    }
}

fn satisfies(ty: &str, value: &Value) -> bool {
    match ty {
        "array"   => value.is_array(),
        "boolean" => value.is_boolean(),
        "integer" => as_integer(value).is_some(),
        "null"    => value.is_null(),
        "number"  => value.is_number(),
        "object"  => value.is_object(),
        "string"  => value.is_string(),
        _         => false,
    }
}

fn convert(ty: &str, value: &Value) -> Option<Value> {
    match (ty, value) {
        ("string", Value::Number(n))  => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b))    => Some(Value::String(b.to_string())),
        ("string", Value::Null)       => Some(Value::String(String::new())),

        ("number", Value::String(s))  => parse_number(s),
        ("integer", Value::String(s)) => parse_number(s).and_then(|n| as_integer(&n).map(Value::from)),
        ("number" | "integer", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("number" | "integer", Value::Null)    => Some(Value::from(0)),

        ("boolean", Value::String(s)) => match s.as_str() {
            "true"  => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _       => None,
        },
        ("boolean", Value::Number(n)) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(Value::Bool(true)),
            Some(x) if x == 0.0 => Some(Value::Bool(false)),
            _                   => None,
        },
        ("boolean", Value::Null) => Some(Value::Bool(false)),

        ("null", Value::String(s)) if s.is_empty()               => Some(Value::Null),
        ("null", Value::Number(n)) if n.as_f64() == Some(0.0)    => Some(Value::Null),
        ("null", Value::Bool(false))                             => Some(Value::Null),

        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(f).map(Value::Number)
}

// Integral numbers, including floats like `3.0`.
fn as_integer(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else { return None };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COERCE: Policy = Policy { coerce_types: true, remove_additional: false };
    const SANITIZE: Policy = Policy { coerce_types: true, remove_additional: true };

    fn run(schema: Value, mut data: Value, policy: Policy) -> Value {
        apply(&schema, &Branches::compile(&schema), &mut data, policy);
        data
    }

    #[test]
    fn scalars_toward_declared_type() {
        assert_eq!(run(json!({ "type": "number" }), json!("2.5"), COERCE), json!(2.5));
        assert_eq!(run(json!({ "type": "integer" }), json!("42"), COERCE), json!(42));
        assert_eq!(run(json!({ "type": "integer" }), json!("4.2"), COERCE), json!("4.2"));
        assert_eq!(run(json!({ "type": "string" }), json!(true), COERCE), json!("true"));
        assert_eq!(run(json!({ "type": "boolean" }), json!("false"), COERCE), json!(false));
        assert_eq!(run(json!({ "type": "boolean" }), json!(1), COERCE), json!(true));
        assert_eq!(run(json!({ "type": "null" }), json!(""), COERCE), json!(null));
        assert_eq!(run(json!({ "type": "number" }), json!("abc"), COERCE), json!("abc"));
        assert_eq!(run(json!({ "type": "number" }), json!(" 10"), COERCE), json!(10));
        assert_eq!(run(json!({ "type": "integer" }), json!("7 "), COERCE), json!(7));
        assert_eq!(run(json!({ "type": "number" }), json!("  "), COERCE), json!("  "));
    }

    #[test]
    fn already_matching_values_are_kept() {
        assert_eq!(run(json!({ "type": ["string", "number"] }), json!(3), COERCE), json!(3));
        assert_eq!(run(json!({ "type": ["number", "string"] }), json!("x"), COERCE), json!("x"));
    }

    #[test]
    fn follows_properties_items_and_all_of() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ids": { "type": "array", "items": { "type": "integer" } },
                "meta": { "allOf": [{ "properties": { "page": { "type": "integer" } } }] }
            },
            "additionalProperties": { "type": "string" }
        });
        let data = json!({ "ids": ["1", "2"], "meta": { "page": "3" }, "note": 7 });
        assert_eq!(
            run(schema, data, COERCE),
            json!({ "ids": [1, 2], "meta": { "page": 3 }, "note": "7" })
        );
    }

    #[test]
    fn tuples_are_positional() {
        let schema = json!({ "prefixItems": [{ "type": "string" }], "items": { "type": "number" } });
        assert_eq!(run(schema, json!([1, "2", "3"]), COERCE), json!(["1", 2, 3]));
    }

    #[test]
    fn strips_only_where_additional_properties_is_false() {
        let schema = json!({
            "type": "object",
            "properties": {
                "foo": { "type": "string" },
                "nested": { "type": "object", "properties": { "a": {} } }
            },
            "patternProperties": { "^x-": {} },
            "additionalProperties": false
        });
        let data = json!({
            "foo": 1,
            "bar": "private property",
            "x-trace": "kept",
            "nested": { "a": 1, "b": 2 }
        });
        assert_eq!(
            run(schema, data, SANITIZE),
            json!({ "foo": "1", "x-trace": "kept", "nested": { "a": 1, "b": 2 } })
        );
    }

    #[test]
    fn coercion_only_policy_never_strips() {
        let schema = json!({ "properties": { "a": {} }, "additionalProperties": false });
        assert_eq!(run(schema, json!({ "a": 1, "b": 2 }), COERCE), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn local_refs_are_followed() {
        let schema = json!({
            "$ref": "#/$defs/user",
            "$defs": {
                "user": { "properties": { "name": {} }, "additionalProperties": false }
            }
        });
        assert_eq!(
            run(schema, json!({ "name": "a", "password": "x" }), SANITIZE),
            json!({ "name": "a" })
        );

        let schema = json!({
            "properties": { "n": { "$ref": "#/definitions/count" } },
            "definitions": { "count": { "type": "integer" } }
        });
        assert_eq!(run(schema, json!({ "n": "3" }), COERCE), json!({ "n": 3 }));
    }

    #[test]
    fn recursive_refs_terminate() {
        assert_eq!(run(json!({ "$ref": "#" }), json!(1), SANITIZE), json!(1));

        let tree = json!({
            "type": "object",
            "properties": { "n": { "type": "integer" }, "child": { "$ref": "#" } },
            "additionalProperties": false
        });
        let data = json!({ "n": "1", "x": 1, "child": { "n": "2", "y": 2 } });
        assert_eq!(run(tree, data, SANITIZE), json!({ "n": 1, "child": { "n": 2 } }));
    }

    #[test]
    fn first_valid_branch_is_applied() {
        let schema = json!({
            "type": "object",
            "properties": { "id": { "anyOf": [{ "type": "string" }, { "type": "null" }] } },
            "additionalProperties": false
        });
        assert_eq!(run(schema, json!({ "id": 5, "secret": 1 }), SANITIZE), json!({ "id": "5" }));

        let variant = |kind: &str, field: &str, ty: &str| {
            json!({
                "type": "object",
                "properties": { "kind": { "const": kind }, field: { "type": ty } },
                "required": ["kind"],
                "additionalProperties": false
            })
        };
        let schema = json!({ "oneOf": [variant("a", "a", "integer"), variant("b", "b", "string")] });
        assert_eq!(
            run(schema, json!({ "kind": "b", "b": 1, "extra": true }), SANITIZE),
            json!({ "kind": "b", "b": "1" })
        );
    }

    #[test]
    fn unmatched_branches_leave_data_alone() {
        let schema = json!({ "anyOf": [{ "type": "integer" }, { "type": "boolean" }] });
        assert_eq!(run(schema, json!("x"), COERCE), json!("x"));

        let schema = json!({
            "anyOf": [{ "type": "object", "required": ["a"], "additionalProperties": false }]
        });
        assert_eq!(run(schema, json!({ "b": 1 }), SANITIZE), json!({ "b": 1 }));
    }

    #[test]
    fn branches_are_indexed_by_pointer() {
        let schema = json!({
            "properties": {
                "a/b": { "oneOf": [{}, {}] },
                "default": { "anyOf": [{}] }
            },
            "$defs": { "x": { "anyOf": [{}] } },
            "enum": [{ "anyOf": [{}] }]
        });
        let branches = Branches::compile(&schema);
        assert_eq!(branches.0.len(), 4);
        assert!(branches.0.contains_key("/properties/default/anyOf/0"));
        assert!(branches.0.contains_key("/properties/a~1b/oneOf/1"));
        assert!(branches.0.contains_key("/$defs/x/anyOf/0"));
    }
}
