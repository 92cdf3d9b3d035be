//! Default response shaping: plain JSON values become `200 application/json`.

use crate::middleware::{Middleware, Next, StepResult};
use daedalus_core::{BoxFuture, Outcome, PipelineError, RequestContext};
use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use http::StatusCode;
use tracing::debug;

/// Stage 4: writes [`Outcome::Json`] values to the response.
///
/// Runs outside [`HandlerResultStage`](super::HandlerResultStage), so a
/// handler result has already been applied (and turned into
/// [`Outcome::Nothing`]) by the time this stage looks at the outcome.
pub struct JsonResponseStage {
    operation: String,
}

impl JsonResponseStage {
    /// Creates the stage for the named operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    fn write(&self, ctx: &mut RequestContext, outcome: Outcome) -> StepResult {
        if outcome.is_nothing() {
            return Ok(Outcome::Nothing);
        }
        if ctx.response().is_closed() {
            debug!(kind = outcome.kind(), "connection closed, discarding result");
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

        match outcome {
            Outcome::Json(value) => {
                let response = ctx.response_mut();
                response.set_status(StatusCode::OK);
                response.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response.json(&value);
                Ok(Outcome::Nothing)
            }
            other => {
                debug!(kind = other.kind(), "result is not JSON");
                Err(PipelineError::contract_violation(
                    &self.operation,
                    format!(
                        "Operation {} handler returned a result that is not JSON serializable.  Are you missing a handler middleware for the response type {}?",
                        self.operation,
                        ctx.header(ACCEPT.as_str()).unwrap_or("*/*")
                    ),
                ))
            }
        }
    }
}

impl Middleware for JsonResponseStage {
    fn name(&self) -> &'static str {
        "json_response"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            let outcome = next.run(ctx).await?;
            self.write(ctx, outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{empty_context, returning};
    use crate::stages::HandlerInvocation;
    use daedalus_core::{handler_fn, HandlerResult, OperationSpec};
    use http::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn operation() -> OperationSpec {
        OperationSpec::builder(Method::GET, "/status")
            .operation_id("getStatus")
            .build()
    }

    async fn run(terminal: &HandlerInvocation) -> (StepResult, RequestContext) {
        let stage = JsonResponseStage::new("getStatus");
        let mut ctx = empty_context(operation());
        let result = stage.process(&mut ctx, Next::chain(&[], terminal)).await;
        (result, ctx)
    }

    #[tokio::test]
    async fn test_json_value_is_written() {
        let terminal = returning(|| Ok(Outcome::Json(json!({"ok": true}))));
        let (result, ctx) = run(&terminal).await;

        assert!(result.unwrap().is_nothing());
        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().header("content-type"), Some("application/json"));
        assert_eq!(ctx.response().body().as_ref(), br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_null_is_json() {
        let terminal = returning(|| Ok(Outcome::Json(serde_json::Value::Null)));
        let (result, ctx) = run(&terminal).await;
        result.unwrap();
        assert_eq!(ctx.response().body().as_ref(), b"null");
    }

    #[tokio::test]
    async fn test_nothing_leaves_response_alone() {
        let terminal = returning(|| Ok(Outcome::Nothing));
        let (result, ctx) = run(&terminal).await;
        result.unwrap();
        assert!(!ctx.response().headers_sent());
        assert!(ctx.response().body().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_outcome_is_a_contract_violation() {
        let terminal = returning(|| Ok(Outcome::other(std::time::Duration::from_secs(1))));
        let (result, _) = run(&terminal).await;
        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Operation getStatus handler returned a result that is not JSON serializable.  Are you missing a handler middleware for the response type */*?"
        );
    }

    #[tokio::test]
    async fn test_unapplied_handler_result_is_not_json() {
        let terminal = returning(|| Ok(Outcome::Shaped(HandlerResult::new())));
        let (result, _) = run(&terminal).await;
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_result_after_headers_sent() {
        let terminal = HandlerInvocation::unbound(Arc::new(handler_fn(|ctx, _args| {
            ctx.response_mut().send("already written");
            Box::pin(async { Ok(Outcome::Json(json!(1))) })
        })));
        let (result, ctx) = run(&terminal).await;
        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Operation getStatus handler returned a result but the request has already sent its headers."
        );
        assert_eq!(ctx.response().body().as_ref(), b"already written");
    }

    #[tokio::test]
    async fn test_closed_connection_discards_result() {
        let terminal = HandlerInvocation::unbound(Arc::new(handler_fn(|ctx, _args| {
            ctx.response_mut().close();
            Box::pin(async { Ok(Outcome::Json(json!(1))) })
        })));
        let (result, ctx) = run(&terminal).await;
        assert!(result.unwrap().is_nothing());
        assert!(ctx.response().body().is_empty());
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let terminal = returning(|| Err(PipelineError::bad_request("nope")));
        let (result, _) = run(&terminal).await;
        assert!(matches!(result, Err(PipelineError::BadRequest { .. })));
    }
}
