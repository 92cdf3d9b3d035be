//! Applies explicit [`HandlerResult`](daedalus_core::HandlerResult) values.

use crate::middleware::{Middleware, Next, StepResult};
use daedalus_core::{BoxFuture, Outcome, PipelineError, RequestContext};
use tracing::{debug, trace};

/// Stage 5: writes a returned handler result to the live response.
///
/// Every other outcome passes through untouched for the JSON stage.
pub struct HandlerResultStage {
    operation: String,
}

impl HandlerResultStage {
    /// Creates the stage for the named operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

impl Middleware for HandlerResultStage {
    fn name(&self) -> &'static str {
        "handler_result"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            let result = match next.run(ctx).await? {
                Outcome::Shaped(result) => result,
                other => return Ok(other),
            };

            if ctx.response().is_closed() {
                debug!("connection closed, discarding handler result");
                return Ok(Outcome::Nothing);
            }
            if ctx.response().headers_sent() {
                return Err(PipelineError::contract_violation(
                    &self.operation,
                    format!(
                        "Operation {} handler returned a result but the request has already sent its headers.",
                        self.operation
                    ),
                ));
            }

            result.apply(ctx.response_mut()).map_err(|err| {
                PipelineError::contract_violation(
                    &self.operation,
                    format!(
                        "Operation {} handler returned an invalid handler result: {err}",
                        self.operation
                    ),
                )
            })?;
            trace!(status = %ctx.response().status(), "handler result applied");
            Ok(Outcome::Nothing)
        })
    }
}
