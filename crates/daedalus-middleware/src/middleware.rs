//! Core middleware trait and the continuation driver.
//!
//! A pipeline is an ordered list of [`Middleware`] steps ending in the
//! handler invocation. Each step receives the request context and a [`Next`]
//! bound to the step after it. A step may:
//!
//! - call `next.run(ctx)` and return its outcome unchanged,
//! - call it and transform or consume the outcome,
//! - not call it at all, short-circuiting every step after it.
//!
//! # Example
//!
//! ```
//! use daedalus_core::{BoxFuture, RequestContext};
//! use daedalus_middleware::{Middleware, Next, StepResult};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, StepResult> {
//!         Box::pin(async move {
//!             let outcome = next.run(ctx).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "operation finished");
//!             outcome
//!         })
//!     }
//! }
//! ```

use crate::stages::HandlerInvocation;
use daedalus_core::{BoxFuture, Outcome, PipelineResult, RequestContext};
use std::sync::Arc;

/// What every step yields: the handler's outcome as seen at that point of the
/// chain, or the error that stopped it.
pub type StepResult = PipelineResult<Outcome>;

/// A shared, type-erased middleware step.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A pipeline step.
///
/// # Invariants
///
/// - `next.run()` is called at most once; `Next` is consumed by it
/// - a step that short-circuits returns its own outcome or error
/// - errors from later steps are returned, not swallowed
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs and by [`OperationPipeline::stage_names`](crate::OperationPipeline::stage_names).
    fn name(&self) -> &'static str;

    /// Runs this step.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult>;
}

/// Continuation bound to the rest of the chain.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More middleware to run.
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of the chain: call the handler.
    Handler(&'a HandlerInvocation),
}

impl<'a> Next<'a> {
    /// Builds the continuation for `stages` followed by `terminal`.
    pub(crate) fn chain(stages: &'a [BoxedMiddleware], terminal: &'a HandlerInvocation) -> Self {
        stages.iter().rev().fold(
            Self {
                inner: NextInner::Handler(terminal),
            },
            |next, middleware| Self {
                inner: NextInner::Chain {
                    middleware: middleware.as_ref(),
                    next: Box::new(next),
                },
            },
        )
    }

    /// Name of the step this continuation runs.
    pub fn stage(&self) -> &'static str {
        match &self.inner {
            NextInner::Chain { middleware, .. } => middleware.name(),
            NextInner::Handler(_) => "invocation",
        }
    }

    /// Runs the rest of the chain.
    pub async fn run(self, ctx: &mut RequestContext) -> StepResult {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, *next).await,
            NextInner::Handler(invocation) => invocation.invoke(ctx).await,
        }
    }
}

/// A middleware built from a closure.
///
/// ```
/// use daedalus_middleware::FnMiddleware;
///
/// let audit = FnMiddleware::new("audit", |ctx, next| {
///     Box::pin(async move {
///         tracing::info!(request_id = %ctx.request_id(), "audited");
///         next.run(ctx).await
///     })
/// });
/// # let _ = audit;
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, StepResult>
        + Send
        + Sync
        + 'static,
{
    /// Creates a named closure middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, StepResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StepResult> {
        (self.func)(ctx, next)
    }
}
