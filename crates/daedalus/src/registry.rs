//! Explicit operation registration and dispatch.
//!
//! Operations are registered by value, in order, then compiled together at
//! startup. The first [`BuildError`] aborts the whole build, so a service
//! never starts with half of its operations unservable.

use std::fmt;
use std::sync::Arc;

use daedalus_config::DaedalusConfig;
use daedalus_core::{
    ArgumentBinding, BuildError, OperationHandler, OperationSpec, PathParams, PipelineError,
    PipelineResult, Request, RequestContext, RequestId, Response,
};
use daedalus_middleware::{
    Middleware, OperationPipeline, PipelineOptions, ResponseExt, SecuritySchemeHandler,
};
use daedalus_schema::resolver::resolve_reference;
use daedalus_schema::CompileSchema;
use http::Method;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde_json::Value;
use tracing::{debug, info, warn};

enum Source {
    Spec(OperationSpec),
    Document {
        method: Method,
        path: String,
        bindings: Vec<ArgumentBinding>,
    },
}

struct Registration {
    source: Source,
    handler: Arc<dyn OperationHandler>,
}

/// Collects operations and their handlers, then builds every pipeline.
///
/// ```
/// use daedalus::prelude::*;
/// use serde_json::json;
///
/// let spec = OperationSpec::builder(Method::GET, "/health")
///     .operation_id("health")
///     .build();
/// let operations = OperationRegistry::new(json!({}))
///     .register(spec, handler_fn(|_ctx, _args| {
///         Box::pin(async { Ok(Outcome::Json(json!({"status": "ok"}))) })
///     }))
///     .build(&DaedalusConfig::default())
///     .unwrap();
///
/// assert_eq!(operations.names().collect::<Vec<_>>(), ["health"]);
/// ```
#[must_use]
pub struct OperationRegistry {
    document: Value,
    registrations: Vec<Registration>,
    options: PipelineOptions,
    custom_compiler: bool,
}

impl OperationRegistry {
    /// Starts a registry for operations of `document`.
    pub fn new(document: Value) -> Self {
        Self {
            document,
            registrations: Vec::new(),
            options: PipelineOptions::new(),
            custom_compiler: false,
        }
    }

    /// Registers an operation described by value.
    pub fn register<H: OperationHandler>(mut self, spec: OperationSpec, handler: H) -> Self {
        self.registrations.push(Registration {
            source: Source::Spec(spec),
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers the operation at `paths.<path>.<method>` of the document.
    ///
    /// Path-level parameters are inherited, parameter and request body
    /// `$ref`s are resolved, and the document's top-level `security` applies
    /// when the operation declares none. Lookup happens in
    /// [`build`](Self::build).
    pub fn register_openapi<H, I>(
        mut self,
        method: Method,
        path: impl Into<String>,
        bindings: I,
        handler: H,
    ) -> Self
    where
        H: OperationHandler,
        I: IntoIterator<Item = ArgumentBinding>,
    {
        self.registrations.push(Registration {
            source: Source::Document {
                method,
                path: path.into(),
                bindings: bindings.into_iter().collect(),
            },
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers the handler for a security scheme.
    pub fn security_scheme<H: SecuritySchemeHandler>(
        mut self,
        scheme: impl Into<String>,
        handler: H,
    ) -> Self {
        self.options = self.options.with_security_scheme(scheme, handler);
        self
    }

    /// Adds a middleware around every handler invocation.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.options = self.options.with_middleware(middleware);
        self
    }

    /// Replaces the schema compiler. The `[schema]` configuration section is
    /// then ignored.
    pub fn compiler<C: CompileSchema + 'static>(mut self, compiler: C) -> Self {
        self.options = self.options.with_compiler(compiler);
        self.custom_compiler = true;
        self
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Builds every pipeline.
    ///
    /// # Errors
    ///
    /// The first [`BuildError`]: an operation missing from the document, a
    /// schema that does not resolve or compile, an unknown security scheme,
    /// a bad argument binding, or two operations with the same name.
    pub fn build(&self, config: &DaedalusConfig) -> Result<Operations, BuildError> {
        let options = if self.custom_compiler {
            self.options.clone()
        } else {
            self.options
                .clone()
                .with_compiler_options(config.compiler_options())
        };

        let mut pipelines: IndexMap<String, Arc<OperationPipeline>> =
            IndexMap::with_capacity(self.registrations.len());
        for registration in &self.registrations {
            let spec = match &registration.source {
                Source::Spec(spec) => spec.clone(),
                Source::Document {
                    method,
                    path,
                    bindings,
                } => operation_from_document(&self.document, method, path, bindings)?,
            };

            let name = spec.display_name();
            if pipelines.contains_key(&name) {
                return Err(BuildError::DuplicateOperation { operation: name });
            }
            let pipeline = OperationPipeline::build(
                spec,
                &self.document,
                Arc::clone(&registration.handler),
                &options,
            )?;
            pipelines.insert(name, Arc::new(pipeline));
        }

        info!(
            service = %config.service_name,
            operations = pipelines.len(),
            "operation pipelines built"
        );
        Ok(Operations {
            pipelines,
            expose_details: config.pipeline.expose_error_details,
        })
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.registrations.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Reads `paths.<path>.<method>` into an [`OperationSpec`].
fn operation_from_document(
    document: &Value,
    method: &Method,
    path: &str,
    bindings: &[ArgumentBinding],
) -> Result<OperationSpec, BuildError> {
    let name = format!("{method} {path}");
    let invalid = |message: String| BuildError::InvalidOperation {
        operation: name.clone(),
        source: serde_json::Error::custom(message),
    };

    let path_item = document
        .get("paths")
        .and_then(|paths| paths.get(path))
        .ok_or_else(|| invalid(format!("path {path} is not declared")))?;
    let method_key = method.as_str().to_ascii_lowercase();
    let Some(Value::Object(operation)) = path_item.get(&method_key) else {
        return Err(invalid(format!("method {method_key} is not declared for {path}")));
    };

    let mut operation = operation.clone();

    let mut parameters: Vec<Value> = Vec::new();
    let inherited = path_item.get("parameters").and_then(Value::as_array);
    let own = operation.get("parameters").and_then(Value::as_array);
    for parameter in inherited.into_iter().chain(own).flatten() {
        let parameter = resolve_reference(document, parameter)
            .ok_or_else(|| invalid("parameter reference does not resolve".to_string()))?;
        // Operation-level parameters override path-level ones with the same name and location.
        let key = (parameter.get("name"), parameter.get("in"));
        parameters.retain(|p| (p.get("name"), p.get("in")) != key);
        parameters.push(parameter.clone());
    }
    operation.insert("parameters".to_string(), Value::Array(parameters));

    if let Some(body) = operation.get("requestBody") {
        let body = resolve_reference(document, body)
            .ok_or_else(|| invalid("requestBody reference does not resolve".to_string()))?
            .clone();
        operation.insert("requestBody".to_string(), body);
    }

    if !operation.contains_key("security") {
        if let Some(security) = document.get("security") {
            operation.insert("security".to_string(), security.clone());
        }
    }

    let spec = OperationSpec::from_openapi(method.clone(), path, &Value::Object(operation))
        .map_err(|source| BuildError::InvalidOperation {
            operation: name.clone(),
            source,
        })?;
    Ok(bindings
        .iter()
        .cloned()
        .fold(spec, OperationSpec::with_binding))
}

/// Built pipelines, keyed by operation display name.
///
/// Cheap to share: wrap in an `Arc` and dispatch from any number of tasks.
pub struct Operations {
    pipelines: IndexMap<String, Arc<OperationPipeline>>,
    expose_details: bool,
}

impl Operations {
    /// Runs the named operation.
    ///
    /// Client errors (including an unknown operation name) come back as
    /// JSON error envelopes carrying the request ID; detail is included only
    /// when `pipeline.expose_error_details` is set.
    ///
    /// # Errors
    ///
    /// Contract violations and internal errors. The host decides how to
    /// answer them and must not keep serving a handler that violates its
    /// response contract.
    pub async fn dispatch(
        &self,
        name: &str,
        request: Request,
        path_params: PathParams,
    ) -> PipelineResult<Response> {
        let Some(pipeline) = self.pipelines.get(name) else {
            let request_id = RequestId::from_headers(request.headers()).to_string();
            debug!(operation_id = name, request_id = %request_id, "unknown operation");
            return Ok(Response::from_pipeline_error(
                &PipelineError::not_found(),
                Some(&request_id),
                self.expose_details,
            ));
        };

        let mut ctx =
            RequestContext::from_request(Arc::clone(pipeline.operation()), request, path_params)
                .await;
        let request_id = ctx.request_id().to_string();

        match pipeline.execute(&mut ctx).await {
            Ok(()) => Ok(ctx.into_response()),
            Err(err) if err.is_client_error() => Ok(Response::from_pipeline_error(
                &err,
                Some(&request_id),
                self.expose_details,
            )),
            Err(err) => {
                warn!(
                    operation_id = name,
                    request_id = %request_id,
                    category = err.category().as_str(),
                    "returning pipeline error to host"
                );
                Err(err)
            }
        }
    }

    /// Returns the pipeline for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<OperationPipeline>> {
        self.pipelines.get(name)
    }

    /// Operation names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns `true` if there are no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl fmt::Debug for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operations")
            .field("operations", &self.pipelines.keys().collect::<Vec<_>>())
            .field("expose_details", &self.expose_details)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "security": [{"apiKey": []}],
            "components": {
                "parameters": {
                    "PetId": {"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}
                },
                "requestBodies": {
                    "Pet": {
                        "required": true,
                        "content": {"application/json": {"schema": {"type": "object"}}}
                    }
                }
            },
            "paths": {
                "/pets/{id}": {
                    "parameters": [
                        {"$ref": "#/components/parameters/PetId"},
                        {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                    ],
                    "get": {
                        "operationId": "getPet",
                        "parameters": [
                            {"name": "verbose", "in": "query", "required": true, "schema": {"type": "boolean"}}
                        ]
                    },
                    "put": {
                        "operationId": "updatePet",
                        "security": [],
                        "requestBody": {"$ref": "#/components/requestBodies/Pet"}
                    }
                }
            }
        })
    }

    #[test]
    fn test_operation_from_document_inherits_parameters() {
        let spec = operation_from_document(
            &document(),
            &Method::GET,
            "/pets/{id}",
            &[ArgumentBinding::parameter("id")],
        )
        .unwrap();

        assert_eq!(spec.operation_id(), Some("getPet"));
        assert_eq!(spec.parameters().len(), 2);
        assert!(spec.parameter("id").unwrap().is_required());
        assert!(spec.parameter("verbose").unwrap().is_required());
        assert_eq!(spec.security().len(), 1);
        assert_eq!(spec.bindings(), &[ArgumentBinding::parameter("id")]);
    }

    #[test]
    fn test_operation_from_document_resolves_body_and_keeps_empty_security() {
        let spec = operation_from_document(&document(), &Method::PUT, "/pets/{id}", &[]).unwrap();

        let body = spec.request_body().unwrap();
        assert!(body.required);
        assert!(body.content.contains_key("application/json"));
        assert!(spec.security().is_empty());
    }

    #[test]
    fn test_operation_from_document_missing() {
        let err = operation_from_document(&document(), &Method::DELETE, "/pets/{id}", &[])
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidOperation { .. }));
        assert_eq!(err.operation(), "DELETE /pets/{id}");

        let err = operation_from_document(&document(), &Method::GET, "/owners", &[]).unwrap_err();
        assert!(err.to_string().contains("/owners"));
    }
}
