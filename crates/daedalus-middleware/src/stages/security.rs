//! Security requirement evaluation.
//!
//! Requirements follow OpenAPI semantics: the operation lists alternatives
//! (any one may be satisfied) and each alternative names schemes that must
//! all pass. An empty alternative allows anonymous access.
//!
//! Scheme handlers are looked up when the pipeline is built, so a typo in a
//! scheme name fails startup instead of every request.

use crate::middleware::{Middleware, Next, StepResult};
use crate::pipeline::FactoryContext;
use daedalus_core::{
    BoxFuture, BuildError, PipelineError, PipelineResult, RequestContext, RequestDataKey,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Authenticates a request against one security scheme.
pub trait SecuritySchemeHandler: Send + Sync + 'static {
    /// Checks the request.
    ///
    /// Returns `Some(value)` when the scheme is satisfied (the value is made
    /// available to the handler), `None` when it is not, and an error for
    /// failures that are not a verdict, such as an unreachable identity
    /// provider.
    fn authenticate<'a>(
        &'a self,
        ctx: &'a RequestContext,
        scopes: &'a [String],
    ) -> BoxFuture<'a, PipelineResult<Option<Value>>>;
}

/// Scheme handler backed by a closure.
pub struct FnSecurityScheme<F> {
    func: F,
}

impl<F> SecuritySchemeHandler for FnSecurityScheme<F>
where
    F: for<'a> Fn(&'a RequestContext, &'a [String]) -> BoxFuture<'a, PipelineResult<Option<Value>>>
        + Send
        + Sync
        + 'static,
{
    fn authenticate<'a>(
        &'a self,
        ctx: &'a RequestContext,
        scopes: &'a [String],
    ) -> BoxFuture<'a, PipelineResult<Option<Value>>> {
        (self.func)(ctx, scopes)
    }
}

/// Creates a scheme handler from a closure.
///
/// ```
/// use daedalus_middleware::security_fn;
/// use serde_json::json;
///
/// let api_key = security_fn(|ctx, _scopes| {
///     let key = ctx.header("x-api-key").map(str::to_owned);
///     Box::pin(async move { Ok(key.filter(|k| k == "secret").map(|_| json!({"client": "ci"}))) })
/// });
/// # let _ = api_key;
/// ```
pub fn security_fn<F>(func: F) -> FnSecurityScheme<F>
where
    F: for<'a> Fn(&'a RequestContext, &'a [String]) -> BoxFuture<'a, PipelineResult<Option<Value>>>
        + Send
        + Sync
        + 'static,
{
    FnSecurityScheme { func }
}

struct SchemeCheck {
    scheme: String,
    scopes: Vec<String>,
    handler: Arc<dyn SecuritySchemeHandler>,
}

/// Stage 1: short-circuits with `401` unless a requirement is satisfied.
pub struct SecurityStage {
    requirements: Vec<Vec<SchemeCheck>>,
}

impl SecurityStage {
    /// Binds every scheme the operation names to its handler.
    pub fn build(factory: &FactoryContext<'_>) -> Result<Self, BuildError> {
        let requirements = factory
            .operation()
            .security()
            .iter()
            .map(|requirement| {
                requirement
                    .iter()
                    .map(|(scheme, scopes)| -> Result<SchemeCheck, BuildError> {
                        let handler = factory.security_handler(scheme).ok_or_else(|| {
                            BuildError::UnknownSecurityScheme {
                                operation: factory.operation_name(),
                                scheme: scheme.clone(),
                            }
                        })?;
                        Ok(SchemeCheck {
                            scheme: scheme.clone(),
                            scopes: scopes.clone(),
                            handler: Arc::clone(handler),
                        })
                    })
                    .collect::<Result<Vec<_>, BuildError>>()
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Self { requirements })
    }

    async fn evaluate(
        ctx: &RequestContext,
        requirement: &[SchemeCheck],
    ) -> PipelineResult<Option<Vec<(String, Value)>>> {
        let mut granted = Vec::with_capacity(requirement.len());
        for check in requirement {
            match check.handler.authenticate(ctx, &check.scopes).await? {
                Some(value) => granted.push((check.scheme.clone(), value)),
                None => {
                    trace!(scheme = %check.scheme, "security scheme not satisfied");
                    return Ok(None);
                }
            }
        }
        Ok(Some(granted))
    }
}

impl Middleware for SecurityStage {
    fn name(&self) -> &'static str {
        "security"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            if self.requirements.is_empty() {
                return next.run(ctx).await;
            }
            for (index, requirement) in self.requirements.iter().enumerate() {
                if let Some(granted) = Self::evaluate(ctx, requirement).await? {
                    trace!(requirement = index, "security requirement satisfied");
                    for (scheme, value) in granted {
                        ctx.set_request_data(RequestDataKey::Security(scheme), Some(value));
                    }
                    return next.run(ctx).await;
                }
            }
            debug!(
                operation_id = %ctx.operation().display_name(),
                "no security requirement satisfied"
            );
            Err(PipelineError::unauthorized("Authentication required."))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineOptions;
    use crate::stages::testing::{empty_context, returning};
    use daedalus_core::{OperationSpec, Outcome};
    use http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn operation(requirements: &[&[&str]]) -> OperationSpec {
        requirements
            .iter()
            .fold(
                OperationSpec::builder(Method::GET, "/secure").operation_id("secure"),
                |builder, schemes| {
                    builder.security(schemes.iter().map(|s| (*s, Vec::new())))
                },
            )
            .build()
    }

    fn allow(value: Value) -> impl SecuritySchemeHandler {
        security_fn(move |_ctx, _scopes| {
            let value = value.clone();
            Box::pin(async move { Ok(Some(value)) })
        })
    }

    fn deny(calls: Arc<AtomicUsize>) -> impl SecuritySchemeHandler {
        security_fn(move |_ctx, _scopes| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(None) })
        })
    }

    fn build(operation: &OperationSpec, options: &PipelineOptions) -> Result<SecurityStage, BuildError> {
        let document = json!({});
        SecurityStage::build(&FactoryContext::new(operation, &document, options))
    }

    #[tokio::test]
    async fn test_no_requirements_pass_through() {
        let operation = operation(&[]);
        let stage = build(&operation, &PipelineOptions::new()).unwrap();
        let terminal = returning(|| Ok(Outcome::Json(json!(1))));
        let mut ctx = empty_context(operation);

        let outcome = stage.process(&mut ctx, Next::chain(&[], &terminal)).await;
        assert!(matches!(outcome, Ok(Outcome::Json(_))));
    }

    #[tokio::test]
    async fn test_any_requirement_may_pass() {
        let calls = Arc::new(AtomicUsize::new(0));
        let options = PipelineOptions::new()
            .with_security_scheme("key", deny(Arc::clone(&calls)))
            .with_security_scheme("bearer", allow(json!({"sub": "ada"})));
        let operation = operation(&[&["key"], &["bearer"]]);
        let stage = build(&operation, &options).unwrap();
        let terminal = returning(|| Ok(Outcome::Nothing));
        let mut ctx = empty_context(operation);

        stage
            .process(&mut ctx, Next::chain(&[], &terminal))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.security("bearer"), Some(&json!({"sub": "ada"})));
        assert!(ctx.security("key").is_none());
    }

    #[tokio::test]
    async fn test_all_schemes_of_a_requirement_must_pass() {
        let calls = Arc::new(AtomicUsize::new(0));
        let options = PipelineOptions::new()
            .with_security_scheme("bearer", allow(json!("token")))
            .with_security_scheme("key", deny(Arc::clone(&calls)));
        let operation = operation(&[&["bearer", "key"]]);
        let stage = build(&operation, &options).unwrap();
        let invoked = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&invoked);
        let terminal = returning(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Nothing)
        });
        let mut ctx = empty_context(operation);

        let err = stage
            .process(&mut ctx, Next::chain(&[], &terminal))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized { .. }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert!(ctx.security("bearer").is_none());
    }

    #[tokio::test]
    async fn test_empty_requirement_allows_anonymous() {
        let calls = Arc::new(AtomicUsize::new(0));
        let options =
            PipelineOptions::new().with_security_scheme("key", deny(Arc::clone(&calls)));
        let operation = operation(&[&["key"], &[]]);
        let stage = build(&operation, &options).unwrap();
        let terminal = returning(|| Ok(Outcome::Nothing));
        let mut ctx = empty_context(operation);

        assert!(stage
            .process(&mut ctx, Next::chain(&[], &terminal))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_handler_errors_propagate() {
        let options = PipelineOptions::new().with_security_scheme(
            "key",
            security_fn(|_ctx, _scopes| {
                Box::pin(async { Err(PipelineError::internal("identity provider down")) })
            }),
        );
        let operation = operation(&[&["key"]]);
        let stage = build(&operation, &options).unwrap();
        let terminal = returning(|| Ok(Outcome::Nothing));
        let mut ctx = empty_context(operation);

        let err = stage
            .process(&mut ctx, Next::chain(&[], &terminal))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Internal { .. }));
    }

    #[test]
    fn test_unknown_scheme_fails_build() {
        let operation = operation(&[&["oauth"]]);
        let err = build(&operation, &PipelineOptions::new()).err().unwrap();
        assert!(matches!(err, BuildError::UnknownSecurityScheme { ref scheme, .. } if scheme == "oauth"));
        assert_eq!(err.operation(), "secure");
    }

    #[tokio::test]
    async fn test_scopes_reach_the_handler() {
        let options = PipelineOptions::new().with_security_scheme(
            "oauth",
            security_fn(|_ctx, scopes| {
                let ok = scopes.iter().any(|s| s == "pets:read");
                Box::pin(async move { Ok(ok.then(|| json!(true))) })
            }),
        );
        let operation = OperationSpec::builder(Method::GET, "/pets")
            .security([("oauth", vec!["pets:read".to_string()])])
            .build();
        let stage = build(&operation, &options).unwrap();
        let terminal = returning(|| Ok(Outcome::Nothing));
        let mut ctx = empty_context(operation);

        stage
            .process(&mut ctx, Next::chain(&[], &terminal))
            .await
            .unwrap();
        assert_eq!(ctx.security("oauth"), Some(&json!(true)));
    }
}
