//! Per-operation pipeline assembly and execution.
//!
//! Everything that can be decided from the operation alone (schema
//! resolution and compilation, security scheme lookup, argument binding
//! checks) happens once in [`OperationPipeline::build`]. Each request then
//! only walks the prebuilt chain.

use crate::middleware::{BoxedMiddleware, Middleware, Next, StepResult};
use crate::stages::{
    BodyStage, HandlerInvocation, HandlerResultStage, JsonResponseStage, ParametersStage,
    SecuritySchemeHandler, SecurityStage,
};
use daedalus_core::{
    BuildError, ErrorCategory, OperationHandler, OperationSpec, PathParams, PipelineResult,
    Request, RequestContext, Response,
};
use daedalus_schema::{
    resolver, CompileSchema, CompilerOptions, SchemaCompiler, SchemaError, ValueProcessor,
};
use daedalus_telemetry::metrics::record_pipeline_request;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument};

/// The fixed stages of every operation pipeline, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Security requirements.
    Security = 1,
    /// Parameter extraction and validation.
    Parameters = 2,
    /// Request body selection and validation.
    Body = 3,
    /// Writes plain JSON results.
    JsonResponse = 4,
    /// Applies [`HandlerResult`](daedalus_core::HandlerResult) values.
    HandlerResult = 5,
    /// Calls the operation handler.
    Invocation = 6,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Parameters => "parameters",
            Self::Body => "body",
            Self::JsonResponse => "json_response",
            Self::HandlerResult => "handler_result",
            Self::Invocation => "invocation",
        }
    }

    /// All stages in execution order.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Security,
            Self::Parameters,
            Self::Body,
            Self::JsonResponse,
            Self::HandlerResult,
            Self::Invocation,
        ]
    }
}

/// Settings shared by every pipeline built from them.
#[derive(Clone)]
pub struct PipelineOptions {
    compiler: Arc<dyn CompileSchema>,
    security: IndexMap<String, Arc<dyn SecuritySchemeHandler>>,
    middleware: Vec<BoxedMiddleware>,
}

impl PipelineOptions {
    /// Options with the built-in schema compiler and no security schemes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compiler: Arc::new(SchemaCompiler::default()),
            security: IndexMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Uses the built-in compiler with the given options.
    #[must_use]
    pub fn with_compiler_options(self, options: CompilerOptions) -> Self {
        self.with_compiler(SchemaCompiler::new(options))
    }

    /// Replaces the schema compiler.
    #[must_use]
    pub fn with_compiler<C: CompileSchema + 'static>(mut self, compiler: C) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    /// Registers the handler for a security scheme name.
    #[must_use]
    pub fn with_security_scheme<H: SecuritySchemeHandler>(
        mut self,
        scheme: impl Into<String>,
        handler: H,
    ) -> Self {
        self.security.insert(scheme.into(), Arc::new(handler));
        self
    }

    /// Appends a middleware that runs after body processing and wraps the
    /// handler invocation.
    #[must_use]
    pub fn with_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Names of the registered security schemes.
    pub fn security_schemes(&self) -> impl Iterator<Item = &str> {
        self.security.keys().map(String::as_str)
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("security", &self.security.keys().collect::<Vec<_>>())
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// What stage builders can see while a pipeline is assembled.
pub struct FactoryContext<'a> {
    operation: &'a OperationSpec,
    document: &'a Value,
    compiler: &'a dyn CompileSchema,
    security: &'a IndexMap<String, Arc<dyn SecuritySchemeHandler>>,
}

impl<'a> FactoryContext<'a> {
    /// A factory for `operation` using the compiler and schemes of `options`.
    pub fn new(
        operation: &'a OperationSpec,
        document: &'a Value,
        options: &'a PipelineOptions,
    ) -> Self {
        Self {
            operation,
            document,
            compiler: options.compiler.as_ref(),
            security: &options.security,
        }
    }

    /// The operation being built.
    pub fn operation(&self) -> &'a OperationSpec {
        self.operation
    }

    /// Display name embedded in error messages.
    pub fn operation_name(&self) -> String {
        self.operation.display_name()
    }

    /// The whole OpenAPI document.
    pub fn document(&self) -> &'a Value {
        self.document
    }

    /// Follows `$ref`s from `schema`; `None` if a reference dangles.
    pub fn resolve_schema(&self, schema: &'a Value) -> Option<&'a Value> {
        resolver::resolve_reference(self.document, schema)
    }

    /// Compiles an already resolved schema.
    pub fn compile(&self, schema: &Value) -> Result<ValueProcessor, SchemaError> {
        self.compiler.compile(schema, self.document)
    }

    /// Handler registered for a security scheme.
    pub fn security_handler(&self, scheme: &str) -> Option<&'a Arc<dyn SecuritySchemeHandler>> {
        self.security.get(scheme)
    }
}

/// A fully assembled pipeline for one operation.
///
/// Immutable once built; share it behind an `Arc` across concurrent requests.
pub struct OperationPipeline {
    operation: Arc<OperationSpec>,
    name: String,
    stages: Vec<BoxedMiddleware>,
    invocation: HandlerInvocation,
}

impl OperationPipeline {
    /// Compiles every schema of `operation` and assembles its chain.
    ///
    /// # Errors
    ///
    /// Any [`BuildError`]; the operation must not be served.
    pub fn build(
        operation: impl Into<Arc<OperationSpec>>,
        document: &Value,
        handler: Arc<dyn OperationHandler>,
        options: &PipelineOptions,
    ) -> Result<Self, BuildError> {
        let operation = operation.into();
        let name = operation.display_name();
        Self::assemble(operation, document, handler, options).map_err(|err| {
            error!(operation_id = %name, error = %err, "failed to build operation pipeline");
            err
        })
    }

    fn assemble(
        operation: Arc<OperationSpec>,
        document: &Value,
        handler: Arc<dyn OperationHandler>,
        options: &PipelineOptions,
    ) -> Result<Self, BuildError> {
        let factory = FactoryContext::new(&operation, document, options);
        let name = factory.operation_name();

        let mut stages: Vec<BoxedMiddleware> = vec![
            Arc::new(SecurityStage::build(&factory)?),
            Arc::new(ParametersStage::build(&factory)?),
            Arc::new(BodyStage::build(&factory)?),
            Arc::new(JsonResponseStage::new(name.clone())),
            Arc::new(HandlerResultStage::new(name.clone())),
        ];
        stages.extend(options.middleware.iter().cloned());
        let invocation = HandlerInvocation::build(&factory, handler)?;

        debug!(
            operation_id = %name,
            stages = stages.len(),
            "built operation pipeline"
        );
        Ok(Self {
            operation,
            name,
            stages,
            invocation,
        })
    }

    /// The operation this pipeline serves.
    #[must_use]
    pub fn operation(&self) -> &Arc<OperationSpec> {
        &self.operation
    }

    /// The operation's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage names in execution order, ending with the invocation.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .map(|stage| stage.name())
            .chain(std::iter::once(Stage::Invocation.name()))
            .collect()
    }

    /// Runs the chain and returns what reaches the outermost stage.
    ///
    /// After the result shapers this is [`Outcome::Nothing`](daedalus_core::Outcome::Nothing)
    /// unless a custom middleware produced something else.
    pub async fn run(&self, ctx: &mut RequestContext) -> StepResult {
        Next::chain(&self.stages, &self.invocation).run(ctx).await
    }

    /// Runs the chain inside an operation span, logging and recording the
    /// result.
    pub async fn execute(&self, ctx: &mut RequestContext) -> PipelineResult<()> {
        let span = info_span!(
            "operation",
            operation_id = %self.name,
            request_id = %ctx.request_id(),
        );
        async {
            let result = self.run(ctx).await;
            let elapsed = ctx.elapsed();
            match result {
                Ok(outcome) => {
                    if !outcome.is_nothing() {
                        debug!(kind = outcome.kind(), "unhandled outcome dropped");
                    }
                    record_pipeline_request(&self.name, "ok", elapsed);
                    Ok(())
                }
                Err(err) => {
                    let category = err.category();
                    match category {
                        ErrorCategory::ContractViolation => {
                            error!(error = %err, "operation broke the response contract");
                        }
                        ErrorCategory::Internal => {
                            warn!(error = %err, "operation failed");
                        }
                        _ => debug!(category = category.as_str(), error = %err, "request rejected"),
                    }
                    record_pipeline_request(&self.name, category.as_str(), elapsed);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Reads `request`, runs the pipeline and returns the written response.
    ///
    /// # Errors
    ///
    /// Every [`PipelineError`](daedalus_core::PipelineError) the chain raised;
    /// mapping client errors to responses is left to the caller.
    pub async fn handle(&self, request: Request, path_params: PathParams) -> PipelineResult<Response> {
        let mut ctx =
            RequestContext::from_request(Arc::clone(&self.operation), request, path_params).await;
        self.execute(&mut ctx).await?;
        Ok(ctx.into_response())
    }
}

impl fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPipeline")
            .field("operation", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}
