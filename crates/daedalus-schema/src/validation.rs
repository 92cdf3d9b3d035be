//! Turns validator errors into [`ValidationIssue`]s.
//!
//! Messages follow the wording most OpenAPI tooling uses (`must be integer`,
//! `must have required property 'name'`), built from the failing keyword's
//! value in the schema rather than from the validator's own text.

use crate::error::ValidationIssue;
use crate::resolver;
use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde_json::Value;

const KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "contains",
    "required",
    "additionalProperties",
    "minProperties",
    "maxProperties",
    "propertyNames",
    "dependentRequired",
    "anyOf",
    "oneOf",
    "not",
];

/// Every issue `validator` finds in `value`, in the validator's order.
pub(crate) fn issues(validator: &Validator, root: &Value, value: &Value) -> Vec<ValidationIssue> {
    validator
        .iter_errors(value)
        .flat_map(|error| to_issues(root, &error))
        .collect()
}

fn to_issues(root: &Value, error: &ValidationError<'_>) -> Vec<ValidationIssue> {
    let instance_path = error.instance_path.to_string();
    match &error.kind {
        ValidationErrorKind::Required { property } => vec![ValidationIssue {
            instance_path,
            keyword: "required",
            message: format!(
                "must have required property '{}'",
                property.to_string().trim_matches('"')
            ),
        }],
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|key| ValidationIssue {
                instance_path: format!("{instance_path}/{}", escape(key)),
                keyword: "additionalProperties",
                message: "must NOT have additional properties".to_string(),
            })
            .collect(),
        ValidationErrorKind::FalseSchema { .. } => vec![ValidationIssue {
            instance_path,
            keyword: "false schema",
            message: "boolean schema is false".to_string(),
        }],
        _ => {
            let schema_path = error.schema_path.to_string();
            let keyword = schema_path.rsplit('/').next().unwrap_or_default();
            let message = describe(keyword, keyword_value(root, &schema_path))
                .unwrap_or_else(|| error.to_string());
            vec![ValidationIssue {
                instance_path,
                keyword: KEYWORDS
                    .iter()
                    .find(|known| **known == keyword)
                    .copied()
                    .unwrap_or("schema"),
                message,
            }]
        }
    }
}

fn describe(keyword: &str, value: Option<&Value>) -> Option<String> {
    Some(match keyword {
        "type" => format!("must be {}", type_names(value?)),
        "enum" => "must be equal to one of the allowed values".to_string(),
        "const" => "must be equal to constant".to_string(),
        "minLength" => format!("must NOT have fewer than {} characters", value?),
        "maxLength" => format!("must NOT have more than {} characters", value?),
        "pattern" => format!("must match pattern \"{}\"", value?.as_str()?),
        "format" => format!("must match format \"{}\"", value?.as_str()?),
        "minimum" => format!("must be >= {}", value?),
        "maximum" => format!("must be <= {}", value?),
        "exclusiveMinimum" => format!("must be > {}", value?),
        "exclusiveMaximum" => format!("must be < {}", value?),
        "multipleOf" => format!("must be multiple of {}", value?),
        "minItems" => format!("must NOT have fewer than {} items", value?),
        "maxItems" => format!("must NOT have more than {} items", value?),
        "uniqueItems" => "must NOT have duplicate items".to_string(),
        "minProperties" => format!("must NOT have fewer than {} properties", value?),
        "maxProperties" => format!("must NOT have more than {} properties", value?),
        "anyOf" => "must match a schema in anyOf".to_string(),
        "oneOf" => "must match exactly one schema in oneOf".to_string(),
        "not" => "must NOT be valid".to_string(),
        _ => return None,
    })
}

fn type_names(value: &Value) -> String {
    match value {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

/// Follows a validator schema path through `root`, stepping through `$ref`s.
fn keyword_value<'r>(root: &'r Value, schema_path: &str) -> Option<&'r Value> {
    let mut current = root;
    for segment in schema_path.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        current = if segment == "$ref" {
            resolver::resolve_pointer(root, resolver::reference_of(current)?)?
        } else {
            match current {
                Value::Object(map) => map.get(&segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            }
        };
    }
    Some(current)
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
