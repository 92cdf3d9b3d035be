//! Schema compilation.
//!
//! A schema is normalized into a self-contained JSON Schema 2020-12 document
//! and handed to [`jsonschema`]. When coercion or defaults are enabled, a
//! small preparer rewrites values before they are validated.

use crate::coercion::Preparer;
use crate::error::{SchemaError, ValidationFailure};
use crate::normalize::{self, Normalized};
use crate::processor::ValueProcessor;
use crate::validation;
use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Options controlling what compiled processors do besides validating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Coerce scalars to the declared type (`"42"` to `42`, `"true"` to `true`, ...).
    pub coerce_types: bool,
    /// Fill missing object properties from their `default`.
    pub use_defaults: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            coerce_types: true,
            use_defaults: true,
        }
    }
}

/// Compiles schemas into value processors.
///
/// This is the seam for plugging in a different schema engine.
pub trait CompileSchema: Send + Sync {
    /// Compiles `schema`, resolving `$ref`s against `document`.
    fn compile(&self, schema: &Value, document: &Value) -> Result<ValueProcessor, SchemaError>;
}

/// The built-in schema compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaCompiler {
    options: CompilerOptions,
}

impl SchemaCompiler {
    /// Creates a compiler with the given options.
    #[must_use]
    pub const fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// The options processors are compiled with.
    #[must_use]
    pub const fn options(&self) -> CompilerOptions {
        self.options
    }

    /// Compiles a schema without wrapping it into a [`ValueProcessor`].
    pub fn compile_schema(
        &self,
        schema: &Value,
        document: &Value,
    ) -> Result<CompiledSchema, SchemaError> {
        let Normalized { root, definitions } = normalize::normalize(schema, document)?;
        let validator = build_validator(&root)?;

        let preparer = if self.options.coerce_types || self.options.use_defaults {
            let preparer = Preparer::build(&root, &definitions, self.options, |branch| {
                build_validator(&normalize::with_definitions(branch, &definitions))
            })?;
            Some(Arc::new(preparer))
        } else {
            None
        };

        trace!(definitions = definitions.len(), "compiled schema");
        Ok(CompiledSchema {
            validator: Arc::new(validator),
            root: Arc::new(root),
            preparer,
        })
    }
}

impl CompileSchema for SchemaCompiler {
    fn compile(&self, schema: &Value, document: &Value) -> Result<ValueProcessor, SchemaError> {
        let compiled = self.compile_schema(schema, document)?;
        Ok(compiled.into_processor())
    }
}

fn build_validator(schema: &Value) -> Result<Validator, SchemaError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .should_validate_formats(true)
        .build(schema)
        .map_err(|err| SchemaError::Invalid {
            message: err.to_string(),
        })
}

/// A compiled schema, ready to process values.
#[derive(Clone)]
pub struct CompiledSchema {
    validator: Arc<Validator>,
    root: Arc<Value>,
    preparer: Option<Arc<Preparer>>,
}

impl CompiledSchema {
    /// Validates `value`, returning it coerced and with defaults applied.
    pub fn process(&self, value: Value) -> Result<Value, ValidationFailure> {
        let value = match &self.preparer {
            Some(preparer) => preparer.prepare(value),
            None => value,
        };
        if self.validator.is_valid(&value) {
            return Ok(value);
        }
        Err(ValidationFailure::new(validation::issues(
            &self.validator,
            &self.root,
            &value,
        )))
    }

    /// Returns `true` if `value` is valid, without keeping the output.
    #[must_use]
    pub fn is_valid(&self, value: &Value) -> bool {
        self.process(value.clone()).is_ok()
    }

    /// Wraps the schema into a shareable processor.
    #[must_use]
    pub fn into_processor(self) -> ValueProcessor {
        ValueProcessor::from_fn(move |value| self.process(value).map_err(Into::into))
    }

    fn definitions(&self) -> Option<&Map<String, Value>> {
        self.root.get(normalize::DEFINITIONS).and_then(Value::as_object)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("definitions", &self.definitions().map_or(0, Map::len))
            .field("prepares", &self.preparer.is_some())
            .finish_non_exhaustive()
    }
}
