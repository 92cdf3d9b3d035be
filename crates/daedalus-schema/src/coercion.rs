//! Type coercion and default filling.
//!
//! Runs before validation, walking the value along the schema. Only the
//! keywords that decide where a value sits (`$ref`, `properties`, `items`,
//! `additionalProperties` and the combinators) are followed; everything else
//! is left to the validator. `not` is never followed, so a negated schema
//! can't rewrite a value into a match.

use crate::compiler::CompilerOptions;
use crate::error::SchemaError;
use crate::normalize::DEFINITIONS;
use crate::resolver;
use jsonschema::Validator;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

type ShapeId = usize;

/// JSON Schema primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => return None,
        })
    }
}

enum Shape {
    Any,
    Node(Box<ShapeNode>),
}

#[derive(Default)]
struct ShapeNode {
    reference: Option<ShapeId>,
    types: Vec<JsonType>,
    default: Option<Value>,
    properties: Vec<(String, ShapeId)>,
    additional: Option<ShapeId>,
    items: Option<ShapeId>,
    all_of: Vec<ShapeId>,
    any_of: Vec<Branch>,
    one_of: Vec<Branch>,
}

/// An `anyOf`/`oneOf` member: the branch is taken when its output validates.
struct Branch {
    shape: ShapeId,
    validator: Validator,
}

/// Rewrites values ahead of validation.
pub(crate) struct Preparer {
    shapes: Vec<Shape>,
    root: ShapeId,
    options: CompilerOptions,
}

impl Preparer {
    /// Builds the preparer for a normalized `root` whose references point
    /// into `definitions`. `validator` compiles branch schemas.
    pub(crate) fn build<F>(
        root: &Value,
        definitions: &Map<String, Value>,
        options: CompilerOptions,
        validator: F,
    ) -> Result<Self, SchemaError>
    where
        F: Fn(&Value) -> Result<Validator, SchemaError>,
    {
        let mut builder = ShapeBuilder {
            definitions,
            validator,
            shapes: Vec::new(),
            references: HashMap::new(),
        };
        let root = builder.shape(root)?;
        Ok(Self {
            shapes: builder.shapes,
            root,
            options,
        })
    }

    pub(crate) fn prepare(&self, value: Value) -> Value {
        self.apply(self.root, value)
    }

    fn apply(&self, id: ShapeId, value: Value) -> Value {
        match &self.shapes[id] {
            Shape::Any => value,
            Shape::Node(node) => self.apply_node(node, value),
        }
    }

    fn apply_node(&self, node: &ShapeNode, mut value: Value) -> Value {
        if let Some(reference) = node.reference {
            value = self.apply(reference, value);
        }
        if self.options.coerce_types && !node.types.is_empty() {
            value = conform(&node.types, value);
        }

        value = match value {
            Value::Object(map) => Value::Object(self.apply_object(node, map)),
            Value::Array(items) => match node.items {
                Some(schema) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| self.apply(schema, item))
                        .collect(),
                ),
                None => Value::Array(items),
            },
            other => other,
        };

        for &sub in &node.all_of {
            value = self.apply(sub, value);
        }
        if let Some(out) = node.any_of.iter().find_map(|b| self.branch(b, &value)) {
            value = out;
        }
        if !node.one_of.is_empty() {
            let mut passing: Vec<Value> =
                node.one_of.iter().filter_map(|b| self.branch(b, &value)).collect();
            if passing.len() == 1 {
                if let Some(out) = passing.pop() {
                    value = out;
                }
            }
        }
        value
    }

    fn apply_object(&self, node: &ShapeNode, mut map: Map<String, Value>) -> Map<String, Value> {
        for (name, child) in &node.properties {
            if let Some(slot) = map.get_mut(name) {
                *slot = self.apply(*child, slot.take());
            } else if self.options.use_defaults {
                if let Some(default) = self.default_of(*child) {
                    map.insert(name.clone(), default.clone());
                }
            }
        }
        if let Some(additional) = node.additional {
            for (key, slot) in &mut map {
                if !node.properties.iter().any(|(name, _)| name == key) {
                    *slot = self.apply(additional, slot.take());
                }
            }
        }
        map
    }

    fn branch(&self, branch: &Branch, value: &Value) -> Option<Value> {
        let out = self.apply(branch.shape, value.clone());
        branch.validator.is_valid(&out).then_some(out)
    }

    /// The `default` of a schema, looking through `$ref`s.
    fn default_of(&self, id: ShapeId) -> Option<&Value> {
        let mut current = id;
        for _ in 0..=self.shapes.len() {
            let Shape::Node(node) = &self.shapes[current] else {
                return None;
            };
            match (&node.default, node.reference) {
                (Some(default), _) => return Some(default),
                (None, Some(reference)) => current = reference,
                (None, None) => return None,
            }
        }
        None
    }
}

struct ShapeBuilder<'d, F> {
    definitions: &'d Map<String, Value>,
    validator: F,
    shapes: Vec<Shape>,
    references: HashMap<String, ShapeId>,
}

impl<F> ShapeBuilder<'_, F>
where
    F: Fn(&Value) -> Result<Validator, SchemaError>,
{
    fn shape(&mut self, schema: &Value) -> Result<ShapeId, SchemaError> {
        let id = self.reserve();
        self.shapes[id] = self.build(schema)?;
        Ok(id)
    }

    fn reserve(&mut self) -> ShapeId {
        self.shapes.push(Shape::Any);
        self.shapes.len() - 1
    }

    fn reference(&mut self, reference: &str) -> Result<ShapeId, SchemaError> {
        if let Some(&id) = self.references.get(reference) {
            return Ok(id);
        }
        let key = reference
            .strip_prefix("#/")
            .and_then(|pointer| pointer.strip_prefix(DEFINITIONS))
            .and_then(|pointer| pointer.strip_prefix('/'));
        let Some(target) = key.and_then(|key| self.definitions.get(key)) else {
            return Err(SchemaError::UnresolvedReference {
                path: "#".to_string(),
                reference: reference.to_string(),
            });
        };
        let id = self.reserve();
        self.references.insert(reference.to_string(), id);
        self.shapes[id] = self.build(target)?;
        Ok(id)
    }

    fn build(&mut self, schema: &Value) -> Result<Shape, SchemaError> {
        let Value::Object(map) = schema else {
            return Ok(Shape::Any);
        };
        let mut node = ShapeNode {
            default: map.get("default").cloned(),
            ..ShapeNode::default()
        };

        if let Some(reference) = resolver::reference_of(schema) {
            node.reference = Some(self.reference(reference)?);
        }
        node.types = match map.get("type") {
            Some(Value::String(name)) => JsonType::parse(name).into_iter().collect(),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(|name| name.as_str().and_then(JsonType::parse))
                .collect(),
            _ => Vec::new(),
        };

        if let Some(Value::Object(properties)) = map.get("properties") {
            for (name, schema) in properties {
                let child = self.shape(schema)?;
                node.properties.push((name.clone(), child));
            }
        }
        if let Some(schema @ Value::Object(_)) = map.get("additionalProperties") {
            node.additional = Some(self.shape(schema)?);
        }
        if let Some(schema @ Value::Object(_)) = map.get("items") {
            node.items = Some(self.shape(schema)?);
        }

        if let Some(Value::Array(schemas)) = map.get("allOf") {
            for schema in schemas {
                let sub = self.shape(schema)?;
                node.all_of.push(sub);
            }
        }
        node.any_of = self.branches(map.get("anyOf"))?;
        node.one_of = self.branches(map.get("oneOf"))?;

        Ok(Shape::Node(Box::new(node)))
    }

    fn branches(&mut self, schemas: Option<&Value>) -> Result<Vec<Branch>, SchemaError> {
        let Some(Value::Array(schemas)) = schemas else {
            return Ok(Vec::new());
        };
        schemas
            .iter()
            .map(|schema| -> Result<Branch, SchemaError> {
                Ok(Branch {
                    shape: self.shape(schema)?,
                    validator: (self.validator)(schema)?,
                })
            })
            .collect()
    }
}

/// Returns `value` unchanged if it has one of `types`, else the first
/// successful coercion, else `value` unchanged for the validator to reject.
fn conform(types: &[JsonType], value: Value) -> Value {
    if types.iter().any(|ty| has_type(*ty, &value)) {
        return value;
    }
    types
        .iter()
        .find_map(|ty| coerce(*ty, &value))
        .unwrap_or(value)
}

fn is_integer(number: &Number) -> bool {
    number.is_i64()
        || number.is_u64()
        || number
            .as_f64()
            .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

fn has_type(ty: JsonType, value: &Value) -> bool {
    match (ty, value) {
        (JsonType::Null, Value::Null)
        | (JsonType::Boolean, Value::Bool(_))
        | (JsonType::Number, Value::Number(_))
        | (JsonType::String, Value::String(_))
        | (JsonType::Array, Value::Array(_))
        | (JsonType::Object, Value::Object(_)) => true,
        (JsonType::Integer, Value::Number(n)) => is_integer(n),
        _ => false,
    }
}

/// Narrows a whole float to `i64` when that is exact. `i64::MAX as f64`
/// rounds up to 2^63, which `i64` can't hold, hence the strict bound.
#[allow(clippy::cast_possible_truncation)]
fn integral_value(f: f64) -> Value {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Number::from(int));
    }
    if let Ok(int) = text.parse::<u64>() {
        return Some(Number::from(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

fn parse_integer(text: &str) -> Option<Value> {
    let number = parse_number(text).filter(is_integer)?;
    if number.is_i64() || number.is_u64() {
        return Some(Value::Number(number));
    }
    number.as_f64().map(integral_value)
}

/// Scalar coercions, modelled on the usual query-string conventions.
fn coerce(ty: JsonType, value: &Value) -> Option<Value> {
    if let Value::Array(items) = value {
        // A single-element array stands for its element.
        return match items.as_slice() {
            [single] if has_type(ty, single) => Some(single.clone()),
            [single] => coerce_scalar(ty, single),
            _ => None,
        };
    }
    if ty == JsonType::Array {
        return match value {
            Value::Object(_) => None,
            scalar => Some(Value::Array(vec![scalar.clone()])),
        };
    }
    coerce_scalar(ty, value)
}

fn coerce_scalar(ty: JsonType, value: &Value) -> Option<Value> {
    match (ty, value) {
        (JsonType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (JsonType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (JsonType::String, Value::Null) => Some(Value::String(String::new())),

        (JsonType::Number, Value::String(s)) => parse_number(s).map(Value::Number),
        (JsonType::Integer, Value::String(s)) => parse_integer(s),
        (JsonType::Number | JsonType::Integer, Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        (JsonType::Number | JsonType::Integer, Value::Null) => Some(Value::from(0)),

        (JsonType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (JsonType::Boolean, Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(Value::Bool(true)),
            Some(f) if f == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        (JsonType::Boolean, Value::Null) => Some(Value::Bool(false)),

        (JsonType::Null, Value::String(s)) if s.is_empty() => Some(Value::Null),
        (JsonType::Null, Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Null),
        (JsonType::Null, Value::Bool(false)) => Some(Value::Null),
        _ => None,
    }
}
