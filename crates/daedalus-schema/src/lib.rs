//! # Daedalus Schema
//!
//! Compiles the JSON Schemas found in an OpenAPI document into reusable
//! [`ValueProcessor`]s.
//!
//! Validation is done by [`jsonschema`] against the schema rewritten to
//! JSON Schema 2020-12, with the OpenAPI 3.0 forms (`nullable`, boolean
//! `exclusiveMinimum`) translated. A processor validates a value and
//! returns it possibly transformed:
//! with type coercion enabled, the query string `"42"` comes back as the
//! number `42` when the schema says `integer`; with defaults enabled,
//! missing object properties are filled from their `default`.
//!
//! ```
//! use daedalus_schema::{CompileSchema, CompilerOptions, SchemaCompiler};
//! use serde_json::json;
//!
//! let document = json!({
//!     "components": {"schemas": {"Id": {"type": "integer", "minimum": 1}}}
//! });
//! let compiler = SchemaCompiler::new(CompilerOptions::default());
//! let processor = compiler
//!     .compile(&json!({"$ref": "#/components/schemas/Id"}), &document)
//!     .unwrap();
//!
//! assert_eq!(processor.process(json!("42")).unwrap(), json!(42));
//! assert!(processor.process(json!("0")).is_err());
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-schema/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod coercion;
mod compiler;
mod error;
mod normalize;
mod processor;
pub mod resolver;
mod validation;

pub use compiler::{CompileSchema, CompiledSchema, CompilerOptions, SchemaCompiler};
pub use error::{ProcessError, SchemaError, ValidationFailure, ValidationIssue};
pub use processor::ValueProcessor;
