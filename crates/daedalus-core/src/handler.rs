//! Operation handler trait.

use crate::context::RequestContext;
use crate::error::{PipelineError, PipelineResult};
use crate::outcome::Outcome;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// A boxed future that is `Send` and has a specific lifetime.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Positional handler arguments, produced from the operation's bindings.
///
/// Each slot is `None` when the bound parameter, body or security value is
/// absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Option<Value>>,
}

impl Arguments {
    /// Creates arguments from resolved values.
    #[must_use]
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the operation binds no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the argument at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Deserializes the argument at `index`.
    pub fn get_as<T: DeserializeOwned>(&self, index: usize) -> PipelineResult<Option<T>> {
        self.get(index)
            .map(|value| {
                T::deserialize(value).map_err(|err| {
                    PipelineError::internal_with_source(
                        format!("handler argument {index} has an unexpected shape"),
                        err,
                    )
                })
            })
            .transpose()
    }

    /// Consumes the arguments.
    #[must_use]
    pub fn into_inner(self) -> Vec<Option<Value>> {
        self.values
    }
}

/// The application code behind an operation.
///
/// Handlers receive the request context and their bound arguments. They can
/// return a value for the response-shaping stages, or write the response
/// directly through [`RequestContext::response_mut`] and return
/// [`Outcome::Nothing`].
pub trait OperationHandler: Send + Sync + 'static {
    /// Handles one request.
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        args: Arguments,
    ) -> BoxFuture<'a, PipelineResult<Outcome>>;
}

/// Handler backed by a closure.
pub struct FnHandler<F> {
    func: F,
}

impl<F> OperationHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Arguments) -> BoxFuture<'a, PipelineResult<Outcome>>
        + Send
        + Sync
        + 'static,
{
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        args: Arguments,
    ) -> BoxFuture<'a, PipelineResult<Outcome>> {
        (self.func)(ctx, args)
    }
}

/// Creates a handler from a closure.
///
/// ```
/// use daedalus_core::{handler_fn, Outcome};
///
/// let handler = handler_fn(|_ctx, args| {
///     Box::pin(async move {
///         let id: Option<u64> = args.get_as(0)?;
///         Ok(Outcome::Json(serde_json::json!({ "id": id })))
///     })
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(func: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Arguments) -> BoxFuture<'a, PipelineResult<Outcome>>
        + Send
        + Sync
        + 'static,
{
    FnHandler { func }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arguments_access() {
        let args = Arguments::new(vec![Some(json!(7)), None, Some(json!({"name": "ada"}))]);
        assert_eq!(args.len(), 3);
        assert_eq!(args.get(0), Some(&json!(7)));
        assert_eq!(args.get(1), None);
        assert_eq!(args.get(9), None);
        assert_eq!(args.get_as::<u8>(0).unwrap(), Some(7));
        assert_eq!(args.get_as::<u8>(1).unwrap(), None);
        assert!(args.get_as::<u8>(2).is_err());
    }

    #[test]
    fn test_empty_arguments() {
        assert!(Arguments::default().is_empty());
        assert!(Arguments::new(vec![None]).into_inner()[0].is_none());
    }
}
