//! Operation descriptions.
//!
//! An [`OperationSpec`] is the slice of an OpenAPI document that describes a
//! single operation: its parameters, request body, security requirements and
//! how the handler wants its arguments bound.
//!
//! # Example
//!
//! ```
//! use daedalus_core::operation::{
//!     ArgumentBinding, OperationSpec, ParameterLocation, ParameterSpec, RequestBodySpec,
//! };
//! use http::Method;
//! use serde_json::json;
//!
//! let spec = OperationSpec::builder(Method::POST, "/users/{id}")
//!     .operation_id("updateUser")
//!     .parameter(
//!         ParameterSpec::new("id", ParameterLocation::Path).schema(json!({"type": "integer"})),
//!     )
//!     .request_body(
//!         RequestBodySpec::new()
//!             .required(true)
//!             .content("application/json", Some(json!({"type": "object"}))),
//!     )
//!     .bind(ArgumentBinding::parameter("id"))
//!     .bind(ArgumentBinding::Body)
//!     .build();
//!
//! assert_eq!(spec.display_name(), "updateUser");
//! assert_eq!(spec.parameters().len(), 1);
//! ```

use http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// A templated path segment.
    Path,
    /// The query string.
    Query,
    /// A request header.
    Header,
    /// A cookie.
    Cookie,
}

impl ParameterLocation {
    /// Lowercase name, as written in OpenAPI `in`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }

    /// Capitalized name used in client-facing messages.
    #[must_use]
    pub const fn capitalized(self) -> &'static str {
        match self {
            Self::Path => "Path",
            Self::Query => "Query",
            Self::Header => "Header",
            Self::Cookie => "Cookie",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name. Header names are matched case-insensitively.
    pub name: String,
    /// Where the parameter is read from.
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// JSON Schema for the parameter value, possibly a `$ref`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ParameterSpec {
    /// Creates an optional parameter without a schema.
    #[must_use]
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            required: false,
            schema: None,
        }
    }

    /// Sets whether the parameter is required.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Path parameters are always required, whatever the document says.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required || self.location == ParameterLocation::Path
    }
}

/// Schema for one request body media type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTypeSpec {
    /// JSON Schema for the body, possibly a `$ref`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// A declared request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBodySpec {
    /// Whether a body must be sent.
    #[serde(default)]
    pub required: bool,
    /// Schemas keyed by media type, in declaration order.
    #[serde(default)]
    pub content: IndexMap<String, MediaTypeSpec>,
}

impl RequestBodySpec {
    /// Creates an optional request body with no media types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the body is required.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Declares a media type with an optional schema.
    #[must_use]
    pub fn content(mut self, media_type: impl Into<String>, schema: Option<Value>) -> Self {
        self.content
            .insert(media_type.into(), MediaTypeSpec { schema });
        self
    }

    /// Declared media types, in declaration order.
    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.content.keys().map(String::as_str)
    }
}

/// One security requirement: scheme name to required scopes.
///
/// All schemes of a requirement must succeed (AND); an operation is
/// authorized when any of its requirements succeeds (OR).
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// Describes where one handler argument comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgumentBinding {
    /// The processed value of the named parameter.
    Parameter(String),
    /// The processed request body.
    Body,
    /// The value produced by the named security scheme.
    Security(String),
}

impl ArgumentBinding {
    /// Binds a parameter by name.
    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    /// Binds a security scheme result by scheme name.
    #[must_use]
    pub fn security(scheme: impl Into<String>) -> Self {
        Self::Security(scheme.into())
    }
}

impl fmt::Display for ArgumentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(name) => write!(f, "parameter {name}"),
            Self::Body => f.write_str("body"),
            Self::Security(scheme) => write!(f, "security {scheme}"),
        }
    }
}

/// The pieces of an OpenAPI operation object the pipeline cares about.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenApiOperation {
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
    #[serde(default)]
    request_body: Option<RequestBodySpec>,
    #[serde(default)]
    security: Vec<SecurityRequirement>,
}

/// A single API operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    method: Method,
    path: String,
    operation_id: Option<String>,
    parameters: Vec<ParameterSpec>,
    request_body: Option<RequestBodySpec>,
    security: Vec<SecurityRequirement>,
    bindings: Vec<ArgumentBinding>,
}

impl OperationSpec {
    /// Creates a new operation builder.
    #[must_use]
    pub fn builder(method: Method, path: impl Into<String>) -> OperationSpecBuilder {
        OperationSpecBuilder::new(method, path)
    }

    /// Reads an operation from its OpenAPI operation object.
    ///
    /// Unknown members (`responses`, `summary`, ...) are ignored. Argument
    /// bindings are not part of OpenAPI and start out empty.
    pub fn from_openapi(
        method: Method,
        path: impl Into<String>,
        operation: &Value,
    ) -> Result<Self, serde_json::Error> {
        let parsed = OpenApiOperation::deserialize(operation)?;
        Ok(Self {
            method,
            path: path.into(),
            operation_id: parsed.operation_id,
            parameters: parsed.parameters,
            request_body: parsed.request_body,
            security: parsed.security,
            bindings: Vec::new(),
        })
    }

    /// Appends an argument binding.
    #[must_use]
    pub fn with_binding(mut self, binding: ArgumentBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template, e.g. `/users/{id}`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The `operationId`, if declared.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Declared parameters, in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Declared request body.
    #[must_use]
    pub fn request_body(&self) -> Option<&RequestBodySpec> {
        self.request_body.as_ref()
    }

    /// Security requirements; empty means no security.
    #[must_use]
    pub fn security(&self) -> &[SecurityRequirement] {
        &self.security
    }

    /// Handler argument bindings, in argument order.
    #[must_use]
    pub fn bindings(&self) -> &[ArgumentBinding] {
        &self.bindings
    }

    /// Name used in logs and error messages: the `operationId`, or
    /// `"METHOD path"` when there is none.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.operation_id {
            Some(id) => id.clone(),
            None => format!("{} {}", self.method, self.path),
        }
    }
}

impl fmt::Display for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation_id {
            Some(id) => f.write_str(id),
            None => write!(f, "{} {}", self.method, self.path),
        }
    }
}

/// Builder for [`OperationSpec`].
#[derive(Debug, Clone)]
pub struct OperationSpecBuilder {
    spec: OperationSpec,
}

impl OperationSpecBuilder {
    /// Creates a new builder for `method path`.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            spec: OperationSpec {
                method,
                path: path.into(),
                operation_id: None,
                parameters: Vec::new(),
                request_body: None,
                security: Vec::new(),
                bindings: Vec::new(),
            },
        }
    }

    /// Sets the `operationId`.
    #[must_use]
    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.spec.operation_id = Some(operation_id.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ParameterSpec) -> Self {
        self.spec.parameters.push(parameter);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn request_body(mut self, body: RequestBodySpec) -> Self {
        self.spec.request_body = Some(body);
        self
    }

    /// Adds a security requirement from `(scheme, scopes)` pairs.
    #[must_use]
    pub fn security<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        let requirement = schemes
            .into_iter()
            .map(|(scheme, scopes)| (scheme.into(), scopes))
            .collect();
        self.spec.security.push(requirement);
        self
    }

    /// Appends an argument binding.
    #[must_use]
    pub fn bind(mut self, binding: ArgumentBinding) -> Self {
        self.spec.bindings.push(binding);
        self
    }

    /// Builds the operation.
    #[must_use]
    pub fn build(self) -> OperationSpec {
        self.spec
    }
}
