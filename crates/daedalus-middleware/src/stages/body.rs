//! Request body selection and validation.

use crate::middleware::{Middleware, Next, StepResult};
use crate::pipeline::FactoryContext;
use daedalus_core::{
    media_type, BoxFuture, BuildError, PipelineError, PipelineResult, RequestContext,
    RequestDataKey,
};
use daedalus_schema::{ProcessError, ValueProcessor};
use daedalus_telemetry::metrics::record_validation_failure;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, trace};

enum BodyMode {
    /// No `requestBody` declared: store whatever was sent.
    PassThrough,
    Declared {
        required: bool,
        processors: IndexMap<String, ValueProcessor>,
    },
}

/// Stage 3: validates the request body against the schema of the best
/// matching declared media type.
///
/// The processed body is stored under [`RequestDataKey::Body`].
pub struct BodyStage {
    mode: BodyMode,
}

impl BodyStage {
    /// Resolves and compiles the schema of every declared media type.
    pub fn build(factory: &FactoryContext<'_>) -> Result<Self, BuildError> {
        let Some(body) = factory.operation().request_body() else {
            return Ok(Self {
                mode: BodyMode::PassThrough,
            });
        };

        let mut processors = IndexMap::with_capacity(body.content.len());
        for (content_type, media) in &body.content {
            let processor = match &media.schema {
                None => ValueProcessor::identity(),
                Some(schema) => {
                    let resolved = factory.resolve_schema(schema).ok_or_else(|| {
                        BuildError::UnresolvedBodySchema {
                            operation: factory.operation_name(),
                            content_type: content_type.clone(),
                        }
                    })?;
                    factory
                        .compile(resolved)
                        .map_err(|source| BuildError::BodySchema {
                            operation: factory.operation_name(),
                            content_type: content_type.clone(),
                            source: Box::new(source),
                        })?
                }
            };
            processors.insert(content_type.clone(), processor);
        }

        Ok(Self {
            mode: BodyMode::Declared {
                required: body.required,
                processors,
            },
        })
    }

    /// Zero bytes, or only whitespace for a JSON body.
    fn is_empty(ctx: &RequestContext) -> bool {
        let body = ctx.raw_body_bytes();
        body.is_empty()
            || (ctx.content_type().is_some_and(media_type::is_json)
                && body.iter().all(u8::is_ascii_whitespace))
    }

    fn extract(
        ctx: &RequestContext,
        required: bool,
        processors: &IndexMap<String, ValueProcessor>,
    ) -> PipelineResult<Option<Value>> {
        if Self::is_empty(ctx) {
            if required {
                return Err(PipelineError::bad_request("Request body is required."));
            }
            return Ok(None);
        }

        if processors.is_empty() {
            return ctx.raw_body();
        }

        let content_type = ctx.content_type().unwrap_or_default();
        let Some((matched, processor)) = media_type::pick(content_type, processors) else {
            if content_type.trim().is_empty() {
                return Err(PipelineError::bad_request(
                    "The Content-Type header is required.",
                ));
            }
            let supported: Vec<&str> = processors.keys().map(String::as_str).collect();
            return Err(PipelineError::bad_request(format!(
                "Request body content type {content_type} is not supported.  Supported content types: {}",
                supported.join(", ")
            )));
        };
        trace!(content_type = matched, "request body media type selected");

        let Some(raw) = ctx.raw_body()? else {
            return Ok(None);
        };
        match processor.process(raw) {
            Ok(value) => Ok(Some(value)),
            Err(ProcessError::Validation(failure)) => {
                record_validation_failure(&ctx.operation().display_name(), "body");
                debug!(content_type = matched, error = %failure, "request body invalid");
                Err(PipelineError::bad_request(format!(
                    "Invalid request body: {failure}"
                )))
            }
            Err(ProcessError::Other(source)) => Err(PipelineError::internal_with_source(
                "Failed to process request body.",
                source,
            )),
        }
    }
}

impl Middleware for BodyStage {
    fn name(&self) -> &'static str {
        "body"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            let body = match &self.mode {
                BodyMode::PassThrough => ctx.raw_body()?,
                BodyMode::Declared {
                    required,
                    processors,
                } => Self::extract(ctx, *required, processors)?,
            };
            ctx.set_request_data(RequestDataKey::Body, body);
            next.run(ctx).await
        })
    }
}
