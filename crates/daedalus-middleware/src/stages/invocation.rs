//! Handler invocation: the end of every chain.

use crate::middleware::StepResult;
use crate::pipeline::FactoryContext;
use daedalus_core::{
    Arguments, ArgumentBinding, BoxFuture, BuildError, OperationHandler, PipelineResult,
    RequestContext,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// Resolves the operation's argument bindings and calls its handler.
pub struct HandlerInvocation {
    handler: Arc<dyn OperationHandler>,
    bindings: Vec<ArgumentBinding>,
}

impl HandlerInvocation {
    /// Checks every binding against the operation.
    ///
    /// A parameter binding must name a declared parameter and a security
    /// binding must name a scheme one of the requirements uses.
    pub fn build(
        factory: &FactoryContext<'_>,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<Self, BuildError> {
        let operation = factory.operation();
        for binding in operation.bindings() {
            let problem = match binding {
                ArgumentBinding::Parameter(name) if operation.parameter(name).is_none() => {
                    Some(format!("parameter {name} is not declared"))
                }
                ArgumentBinding::Security(scheme)
                    if !operation
                        .security()
                        .iter()
                        .any(|requirement| requirement.contains_key(scheme)) =>
                {
                    Some(format!("security scheme {scheme} is not required"))
                }
                _ => None,
            };
            if let Some(message) = problem {
                return Err(BuildError::InvalidBinding {
                    operation: factory.operation_name(),
                    message,
                });
            }
        }

        Ok(Self {
            handler,
            bindings: operation.bindings().to_vec(),
        })
    }

    #[cfg(test)]
    pub(crate) fn unbound(handler: Arc<dyn OperationHandler>) -> Self {
        Self {
            handler,
            bindings: Vec::new(),
        }
    }

    /// The bindings arguments are resolved from, in order.
    pub fn bindings(&self) -> &[ArgumentBinding] {
        &self.bindings
    }

    fn arguments(&self, ctx: &RequestContext) -> PipelineResult<Arguments> {
        let values = self
            .bindings
            .iter()
            .map(|binding| -> PipelineResult<Option<Value>> {
                Ok(match binding {
                    ArgumentBinding::Parameter(name) => ctx.parameter(name)?.cloned(),
                    ArgumentBinding::Body => ctx.body()?.cloned(),
                    ArgumentBinding::Security(scheme) => ctx.security(scheme).cloned(),
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Arguments::new(values))
    }

    /// Calls the handler with the resolved arguments.
    pub fn invoke<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            let args = self.arguments(ctx)?;
            trace!(arguments = args.len(), "invoking operation handler");
            self.handler.invoke(ctx, args).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineOptions;
    use crate::stages::testing::empty_context;
    use daedalus_core::{
        handler_fn, OperationSpec, Outcome, ParameterLocation, ParameterSpec, PipelineError,
        RequestDataKey,
    };
    use http::Method;
    use serde_json::json;

    fn echo_args() -> Arc<dyn OperationHandler> {
        Arc::new(handler_fn(|_ctx, args| {
            Box::pin(async move {
                let values: Vec<Value> = args
                    .into_inner()
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect();
                Ok(Outcome::Json(Value::Array(values)))
            })
        }))
    }

    fn build(operation: &OperationSpec) -> Result<HandlerInvocation, BuildError> {
        let options = PipelineOptions::new();
        HandlerInvocation::build(
            &FactoryContext::new(operation, &Value::Null, &options),
            echo_args(),
        )
    }

    fn operation() -> OperationSpec {
        OperationSpec::builder(Method::PUT, "/pets/{id}")
            .operation_id("updatePet")
            .parameter(ParameterSpec::new("id", ParameterLocation::Path))
            .security([("bearer", Vec::new())])
            .bind(ArgumentBinding::parameter("id"))
            .bind(ArgumentBinding::Body)
            .bind(ArgumentBinding::security("bearer"))
            .build()
    }

    #[tokio::test]
    async fn test_arguments_follow_binding_order() {
        let operation = operation();
        let invocation = build(&operation).unwrap();
        let mut ctx = empty_context(operation);
        ctx.set_request_data(RequestDataKey::Parameter("id".into()), Some(json!(7)));
        ctx.set_request_data(RequestDataKey::Body, None);
        ctx.set_request_data(RequestDataKey::Security("bearer".into()), Some(json!("ada")));

        match invocation.invoke(&mut ctx).await.unwrap() {
            Outcome::Json(value) => assert_eq!(value, json!([7, null, "ada"])),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unpopulated_binding_is_a_contract_violation() {
        let operation = operation();
        let invocation = build(&operation).unwrap();
        let mut ctx = empty_context(operation);

        let err = invocation.invoke(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::ContractViolation { .. }));
    }

    #[test]
    fn test_undeclared_parameter_binding_fails_build() {
        let operation = OperationSpec::builder(Method::GET, "/pets")
            .bind(ArgumentBinding::parameter("limit"))
            .build();
        let err = build(&operation).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Operation GET /pets has an invalid argument binding: parameter limit is not declared"
        );
    }

    #[test]
    fn test_unrequired_security_binding_fails_build() {
        let operation = OperationSpec::builder(Method::GET, "/pets")
            .bind(ArgumentBinding::security("bearer"))
            .build();
        assert!(matches!(
            build(&operation),
            Err(BuildError::InvalidBinding { .. })
        ));
    }

    #[test]
    fn test_bindings_are_kept() {
        let invocation = build(&operation()).unwrap();
        assert_eq!(invocation.bindings().len(), 3);
    }
}
