//! Rewrites an OpenAPI schema into a self-contained JSON Schema 2020-12
//! document.
//!
//! Every document-local `$ref` is copied under the root's `$defs` and the
//! reference is rewritten to point there. OpenAPI 3.0 forms are translated
//! on the way: `nullable: true` adds `"null"` to `type`, and a boolean
//! `exclusiveMinimum`/`exclusiveMaximum` takes over the paired inclusive
//! bound.

use crate::error::SchemaError;
use crate::resolver;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Key under which inlined references live in the root schema.
pub(crate) const DEFINITIONS: &str = "$defs";

/// Keywords whose value is a single subschema.
const SUBSCHEMA: &[&str] = &[
    "additionalProperties",
    "not",
    "contains",
    "propertyNames",
    "if",
    "then",
    "else",
    "unevaluatedProperties",
    "unevaluatedItems",
];

/// Keywords whose value is an array of subschemas.
const SUBSCHEMA_LIST: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords whose value maps names to subschemas.
const SUBSCHEMA_MAP: &[&str] = &["properties", "patternProperties", "dependentSchemas"];

/// Keywords that would change how references resolve once inlined.
const DROPPED: &[&str] = &["$id", "id", "$schema", "$anchor", "$defs", "definitions"];

/// Keywords evaluated against the same instance as the schema holding them.
const IN_PLACE: &[&str] = &["not", "if", "then", "else"];

pub(crate) struct Normalized {
    /// The schema with `$defs` attached.
    pub root: Value,
    /// The inlined definitions, keyed as in `$defs`.
    pub definitions: Map<String, Value>,
}

struct Definition {
    key: String,
    reference: String,
    schema: Value,
}

pub(crate) fn normalize(schema: &Value, document: &Value) -> Result<Normalized, SchemaError> {
    let mut normalizer = Normalizer {
        document,
        keys: HashMap::new(),
        definitions: Vec::new(),
    };
    let root = normalizer.schema(schema, "#")?;
    check_cycles(&root, &normalizer.definitions)?;

    let definitions: Map<String, Value> = normalizer
        .definitions
        .into_iter()
        .map(|definition| (definition.key, definition.schema))
        .collect();
    Ok(Normalized {
        root: with_definitions(&root, &definitions),
        definitions,
    })
}

/// Attaches `definitions` to `schema` so its rewritten references resolve.
pub(crate) fn with_definitions(schema: &Value, definitions: &Map<String, Value>) -> Value {
    if definitions.is_empty() {
        return schema.clone();
    }
    match schema {
        Value::Object(map) => {
            let mut map = map.clone();
            map.insert(DEFINITIONS.to_string(), Value::Object(definitions.clone()));
            Value::Object(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("allOf".to_string(), Value::Array(vec![other.clone()]));
            map.insert(DEFINITIONS.to_string(), Value::Object(definitions.clone()));
            Value::Object(map)
        }
    }
}

struct Normalizer<'d> {
    document: &'d Value,
    keys: HashMap<String, String>,
    definitions: Vec<Definition>,
}

impl Normalizer<'_> {
    fn schema(&mut self, schema: &Value, path: &str) -> Result<Value, SchemaError> {
        let map = match schema {
            Value::Bool(_) => return Ok(schema.clone()),
            Value::Object(map) => map,
            _ => {
                return Err(SchemaError::InvalidSchema {
                    path: path.to_string(),
                })
            }
        };

        let mut out = Map::with_capacity(map.len());
        for (keyword, value) in map {
            let keyword = keyword.as_str();
            if DROPPED.contains(&keyword) {
                continue;
            }
            let child = format!("{path}/{keyword}");
            let (keyword, value) = match keyword {
                "$ref" => ("$ref", Value::String(self.reference(value, path)?)),
                // Draft 4 tuple form.
                "items" if value.is_array() => ("prefixItems", self.list(value, &child)?),
                "items" => ("items", self.schema(value, &child)?),
                k if SUBSCHEMA.contains(&k) => (k, self.schema(value, &child)?),
                k if SUBSCHEMA_LIST.contains(&k) => (k, self.list(value, &child)?),
                k if SUBSCHEMA_MAP.contains(&k) => (k, self.map(value, &child)?),
                k => (k, value.clone()),
            };
            out.insert(keyword.to_string(), value);
        }
        openapi30(&mut out);
        Ok(Value::Object(out))
    }

    fn list(&mut self, value: &Value, path: &str) -> Result<Value, SchemaError> {
        match value {
            Value::Array(schemas) => schemas
                .iter()
                .enumerate()
                .map(|(i, schema)| self.schema(schema, &format!("{path}/{i}")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            // Left for the meta-schema check to reject.
            other => Ok(other.clone()),
        }
    }

    fn map(&mut self, value: &Value, path: &str) -> Result<Value, SchemaError> {
        match value {
            Value::Object(schemas) => {
                let mut out = Map::with_capacity(schemas.len());
                for (name, schema) in schemas {
                    out.insert(name.clone(), self.schema(schema, &format!("{path}/{name}"))?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn reference(&mut self, value: &Value, path: &str) -> Result<String, SchemaError> {
        let Value::String(reference) = value else {
            return Err(SchemaError::InvalidSchema {
                path: format!("{path}/$ref"),
            });
        };
        if let Some(key) = self.keys.get(reference) {
            return Ok(pointer(key));
        }

        let document = self.document;
        let target = resolver::resolve_pointer(document, reference).ok_or_else(|| {
            SchemaError::UnresolvedReference {
                path: path.to_string(),
                reference: reference.clone(),
            }
        })?;

        let index = self.definitions.len();
        let key = definition_key(reference, index);
        self.keys.insert(reference.clone(), key.clone());
        self.definitions.push(Definition {
            key: key.clone(),
            reference: reference.clone(),
            schema: Value::Bool(true),
        });
        self.definitions[index].schema = self.schema(target, reference)?;
        Ok(pointer(&key))
    }
}

fn pointer(key: &str) -> String {
    format!("#/{DEFINITIONS}/{key}")
}

/// `#/components/schemas/Pet` becomes `Pet_0`.
fn definition_key(reference: &str, index: usize) -> String {
    let name: String = reference
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("{name}_{index}")
}

fn openapi30(map: &mut Map<String, Value>) {
    if map.remove("nullable") == Some(Value::Bool(true)) {
        let widened = match map.get("type") {
            Some(Value::String(name)) if name != "null" => Some(vec![
                Value::String(name.clone()),
                Value::from("null"),
            ]),
            Some(Value::Array(names)) if !names.iter().any(|n| *n == "null") => {
                let mut names = names.clone();
                names.push(Value::from("null"));
                Some(names)
            }
            _ => None,
        };
        if let Some(types) = widened {
            map.insert("type".to_string(), Value::Array(types));
        }
    }

    for (exclusive, inclusive) in [("exclusiveMinimum", "minimum"), ("exclusiveMaximum", "maximum")] {
        match map.get(exclusive).and_then(Value::as_bool) {
            Some(true) => {
                map.remove(exclusive);
                if let Some(bound) = map.remove(inclusive) {
                    map.insert(exclusive.to_string(), bound);
                }
            }
            Some(false) => {
                map.remove(exclusive);
            }
            None => {}
        }
    }
}

/// Rejects reference cycles that can be re-entered without descending into
/// the value. Cycles through `properties`, `items` and the like are fine:
/// every lap consumes a level of the input.
fn check_cycles(root: &Value, definitions: &[Definition]) -> Result<(), SchemaError> {
    let index: HashMap<String, usize> = definitions
        .iter()
        .enumerate()
        .map(|(i, definition)| (pointer(&definition.key), i))
        .collect();
    let edges = |schema: &Value| -> Vec<usize> {
        let mut references = Vec::new();
        in_place_references(schema, &mut references);
        references
            .into_iter()
            .filter_map(|reference| index.get(reference).copied())
            .collect()
    };
    let graph: Vec<Vec<usize>> = definitions.iter().map(|d| edges(&d.schema)).collect();

    let mut state = vec![Visit::New; definitions.len()];
    for start in edges(root) {
        visit(start, &graph, &mut state).map_err(|at| SchemaError::CircularReference {
            reference: definitions[at].reference.clone(),
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

fn visit(node: usize, graph: &[Vec<usize>], state: &mut [Visit]) -> Result<(), usize> {
    match state[node] {
        Visit::Done => return Ok(()),
        Visit::Active => return Err(node),
        Visit::New => {}
    }
    state[node] = Visit::Active;
    for &next in &graph[node] {
        visit(next, graph, state)?;
    }
    state[node] = Visit::Done;
    Ok(())
}

fn in_place_references<'s>(schema: &'s Value, out: &mut Vec<&'s str>) {
    let Value::Object(map) = schema else {
        return;
    };
    if let Some(Value::String(reference)) = map.get("$ref") {
        out.push(reference);
    }
    for keyword in ["allOf", "anyOf", "oneOf"] {
        if let Some(Value::Array(schemas)) = map.get(keyword) {
            for schema in schemas {
                in_place_references(schema, out);
            }
        }
    }
    if let Some(Value::Object(schemas)) = map.get("dependentSchemas") {
        for schema in schemas.values() {
            in_place_references(schema, out);
        }
    }
    for keyword in IN_PLACE {
        if let Some(schema) = map.get(*keyword) {
            in_place_references(schema, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schemas(definitions: Value) -> Value {
        json!({"components": {"schemas": definitions}})
    }

    fn normalize_ref(name: &str, document: &Value) -> Result<Normalized, SchemaError> {
        normalize(&json!({"$ref": format!("#/components/schemas/{name}")}), document)
    }

    #[test]
    fn test_nullable_and_boolean_bounds() {
        let normalized = normalize(
            &json!({
                "type": "integer",
                "nullable": true,
                "minimum": 1,
                "exclusiveMinimum": true,
                "maximum": 9,
                "exclusiveMaximum": false
            }),
            &json!({}),
        )
        .unwrap();
        assert_eq!(
            normalized.root,
            json!({"type": ["integer", "null"], "exclusiveMinimum": 1, "maximum": 9})
        );
    }

    #[test]
    fn test_references_are_inlined_once() {
        let document = schemas(json!({"Id": {"type": "integer"}}));
        let normalized = normalize(
            &json!({"properties": {
                "a": {"$ref": "#/components/schemas/Id"},
                "b": {"$ref": "#/components/schemas/Id"}
            }}),
            &document,
        )
        .unwrap();
        assert_eq!(normalized.definitions.len(), 1);
        assert_eq!(normalized.root["properties"]["a"], json!({"$ref": "#/$defs/Id_0"}));
        assert_eq!(normalized.root["$defs"]["Id_0"], json!({"type": "integer"}));
    }

    #[test]
    fn test_identifiers_are_dropped() {
        let normalized =
            normalize(&json!({"$id": "urn:pet", "$schema": "x", "type": "object"}), &json!({}))
                .unwrap();
        assert_eq!(normalized.root, json!({"type": "object"}));
    }

    #[test]
    fn test_cycles_through_combinators_are_rejected() {
        for schema in [
            json!({"allOf": [{"$ref": "#/components/schemas/A"}]}),
            json!({"anyOf": [{"type": "string"}, {"$ref": "#/components/schemas/A"}]}),
            json!({"not": {"oneOf": [{"$ref": "#/components/schemas/A"}]}}),
            json!({"type": "object", "$ref": "#/components/schemas/A"}),
        ] {
            let document = schemas(json!({"A": schema}));
            let err = normalize_ref("A", &document).err();
            assert!(
                matches!(err, Some(SchemaError::CircularReference { ref reference }) if reference == "#/components/schemas/A"),
                "{schema}"
            );
        }
    }

    #[test]
    fn test_indirect_alias_cycle_is_rejected() {
        let document = schemas(json!({
            "A": {"$ref": "#/components/schemas/B"},
            "B": {"allOf": [{"$ref": "#/components/schemas/A"}]}
        }));
        assert!(matches!(
            normalize_ref("A", &document),
            Err(SchemaError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_cycles_through_values_are_allowed() {
        let document = schemas(json!({
            "Tree": {"properties": {"children": {"items": {"$ref": "#/components/schemas/Tree"}}}},
            "List": {"anyOf": [{"type": "null"}, {"properties": {"next": {"$ref": "#/components/schemas/List"}}}]},
            "Map": {"additionalProperties": {"$ref": "#/components/schemas/Map"}}
        }));
        for name in ["Tree", "List", "Map"] {
            assert!(normalize_ref(name, &document).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_dangling_reference_names_its_location() {
        let err = normalize(
            &json!({"properties": {"owner": {"$ref": "#/components/schemas/Missing"}}}),
            &json!({}),
        )
        .err();
        assert!(matches!(
            err,
            Some(SchemaError::UnresolvedReference { ref path, .. }) if path == "#/properties/owner"
        ));
    }
}
