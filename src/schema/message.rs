//! Human-readable phrasing for validation failures.
//!
//! Messages read `must ...` relative to the failing location, so that the
//! rendered error reads `'body/age' must be >= 0`. Keywords without a phrase
//! here fall back to the engine's own wording.

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::ValidationError;
use serde_json::Value;

pub(super) fn describe(error: &ValidationError<'_>) -> String {
    use ValidationErrorKind as K;

    match error.kind() {
        K::Required { property } => {
            format!("must have required property '{}'", property.as_str().unwrap_or_default())
        }
        K::Type { kind: TypeKind::Single(ty) } => format!("must be {ty}"),
        K::Type { kind: TypeKind::Multiple(types) } => {
            let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            format!("must be {}", names.join(","))
        }
        K::AdditionalProperties { .. } => "must NOT have additional properties".to_owned(),
        K::Enum { .. } => "must be equal to one of the allowed values".to_owned(),
        K::Constant { .. } => "must be equal to constant".to_owned(),
        K::Minimum { limit } => format!("must be >= {}", plain(limit)),
        K::Maximum { limit } => format!("must be <= {}", plain(limit)),
        K::ExclusiveMinimum { limit } => format!("must be > {}", plain(limit)),
        K::ExclusiveMaximum { limit } => format!("must be < {}", plain(limit)),
        K::MultipleOf { multiple_of } => format!("must be multiple of {multiple_of}"),
        K::MinLength { limit } => format!("must NOT have fewer than {limit} characters"),
        K::MaxLength { limit } => format!("must NOT have more than {limit} characters"),
        K::MinItems { limit } => format!("must NOT have fewer than {limit} items"),
        K::MaxItems { limit } => format!("must NOT have more than {limit} items"),
        K::MinProperties { limit } => format!("must NOT have fewer than {limit} properties"),
        K::MaxProperties { limit } => format!("must NOT have more than {limit} properties"),
        K::UniqueItems => "must NOT have duplicate items".to_owned(),
        K::Pattern { pattern } => format!("must match pattern \"{pattern}\""),
        K::Format { format } => format!("must match format \"{format}\""),
        K::Contains => "must contain at least 1 valid item(s)".to_owned(),
        K::AnyOf { .. } => "must match a schema in anyOf".to_owned(),
        K::OneOfNotValid { .. } | K::OneOfMultipleValid { .. } => {
            "must match exactly one schema in oneOf".to_owned()
        }
        K::Not { .. } => "must NOT be valid".to_owned(),
        K::FalseSchema => "boolean schema is false".to_owned(),
        _ => error.to_string(),
    }
}

// Numbers print bare; anything else prints as JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(schema: Value, data: Value) -> Vec<String> {
        let validator = jsonschema::validator_for(&schema).unwrap();
        validator.iter_errors(&data).map(|e| describe(&e)).collect()
    }

    #[test]
    fn common_keywords() {
        assert_eq!(messages(json!({ "type": "string" }), json!(1)), vec!["must be string"]);
        assert_eq!(messages(json!({ "minimum": 0 }), json!(-1)), vec!["must be >= 0"]);
        assert_eq!(
            messages(json!({ "maxLength": 2 }), json!("abc")),
            vec!["must NOT have more than 2 characters"]
        );
        assert_eq!(
            messages(json!({ "enum": ["a", "b"] }), json!("c")),
            vec!["must be equal to one of the allowed values"]
        );
        assert_eq!(messages(json!(false), json!(1)), vec!["boolean schema is false"]);
        assert_eq!(
            messages(
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
                json!({ "x": 1 })
            ),
            vec!["must NOT have additional properties"]
        );
    }

    #[test]
    fn multiple_types_are_listed() {
        assert_eq!(
            messages(json!({ "type": ["string", "null"] }), json!(1)),
            vec!["must be null,string"]
        );
    }
}
