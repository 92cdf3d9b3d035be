//! Parameter extraction and validation.

use crate::middleware::{Middleware, Next, StepResult};
use crate::pipeline::FactoryContext;
use daedalus_core::{
    BoxFuture, BuildError, ParameterLocation, PipelineError, PipelineResult, RequestContext,
    RequestDataKey,
};
use daedalus_schema::{ProcessError, ValueProcessor};
use daedalus_telemetry::metrics::record_validation_failure;
use serde_json::Value;
use tracing::{debug, trace};

struct CompiledParameter {
    name: String,
    location: ParameterLocation,
    required: bool,
    processor: ValueProcessor,
}

/// Stage 2: validates every declared parameter, in declaration order.
///
/// Processed values are stored under [`RequestDataKey::Parameter`]; an
/// absent optional parameter is stored as `None`. Problems with path
/// parameters are reported as `404` without detail, since a bad path segment
/// means the route does not exist for that value.
pub struct ParametersStage {
    parameters: Vec<CompiledParameter>,
}

impl ParametersStage {
    /// Resolves and compiles every parameter schema.
    pub fn build(factory: &FactoryContext<'_>) -> Result<Self, BuildError> {
        let parameters = factory
            .operation()
            .parameters()
            .iter()
            .map(|parameter| -> Result<CompiledParameter, BuildError> {
                let processor = match &parameter.schema {
                    None => ValueProcessor::identity(),
                    Some(schema) => {
                        let resolved = factory.resolve_schema(schema).ok_or_else(|| {
                            BuildError::UnresolvedParameterSchema {
                                operation: factory.operation_name(),
                                parameter: parameter.name.clone(),
                            }
                        })?;
                        factory
                            .compile(resolved)
                            .map_err(|source| BuildError::ParameterSchema {
                                operation: factory.operation_name(),
                                location: parameter.location.as_str().to_string(),
                                parameter: parameter.name.clone(),
                                source: Box::new(source),
                            })?
                    }
                };
                Ok(CompiledParameter {
                    name: parameter.name.clone(),
                    location: parameter.location,
                    required: parameter.is_required(),
                    processor,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Self { parameters })
    }

    fn process_one(
        ctx: &RequestContext,
        parameter: &CompiledParameter,
    ) -> PipelineResult<Option<Value>> {
        let Some(raw) = ctx.raw_parameter(parameter.location, &parameter.name) else {
            if parameter.location == ParameterLocation::Header
                && ctx.headers().contains_key(parameter.name.as_str())
            {
                record_validation_failure(
                    &ctx.operation().display_name(),
                    parameter.location.as_str(),
                );
                return Err(PipelineError::bad_request(format!(
                    "{} parameter \"{}\" is invalid: must be valid UTF-8",
                    parameter.location.capitalized(),
                    parameter.name
                )));
            }
            if parameter.location == ParameterLocation::Path {
                debug!(parameter = %parameter.name, "path parameter missing");
                return Err(PipelineError::not_found());
            }
            if parameter.required {
                return Err(PipelineError::bad_request(format!(
                    "{} parameter \"{}\" is required.",
                    parameter.location.capitalized(),
                    parameter.name
                )));
            }
            return Ok(None);
        };

        match parameter.processor.process(raw) {
            Ok(value) => Ok(Some(value)),
            Err(ProcessError::Validation(failure)) => {
                record_validation_failure(
                    &ctx.operation().display_name(),
                    parameter.location.as_str(),
                );
                if parameter.location == ParameterLocation::Path {
                    debug!(parameter = %parameter.name, error = %failure, "path parameter invalid");
                    return Err(PipelineError::not_found());
                }
                Err(PipelineError::bad_request(format!(
                    "{} parameter \"{}\" is invalid: {}",
                    parameter.location.capitalized(),
                    parameter.name,
                    failure
                )))
            }
            Err(ProcessError::Other(source)) => Err(PipelineError::internal_with_source(
                format!(
                    "Failed to process {} parameter \"{}\".",
                    parameter.location, parameter.name
                ),
                source,
            )),
        }
    }
}

impl Middleware for ParametersStage {
    fn name(&self) -> &'static str {
        "parameters"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            for parameter in &self.parameters {
                let value = Self::process_one(ctx, parameter)?;
                trace!(
                    parameter = %parameter.name,
                    location = parameter.location.as_str(),
                    present = value.is_some(),
                    "parameter processed"
                );
                ctx.set_request_data(RequestDataKey::Parameter(parameter.name.clone()), value);
            }
            next.run(ctx).await
        })
    }
}
