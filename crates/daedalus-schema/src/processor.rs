//! Reusable value processors.

use crate::error::ProcessError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type ProcessFn = dyn Fn(Value) -> Result<Value, ProcessError> + Send + Sync;

/// A compiled validate-and-transform function.
///
/// Processors are cheap to clone and safe to share across concurrent
/// requests: they hold no per-call state.
///
/// ```
/// use daedalus_schema::{ProcessError, ValidationFailure, ValueProcessor};
/// use serde_json::json;
///
/// let even = ValueProcessor::from_fn(|value| match value.as_i64() {
///     Some(n) if n % 2 == 0 => Ok(value),
///     _ => Err(ValidationFailure::single("even", "must be even").into()),
/// });
/// assert!(even.process(json!(4)).is_ok());
/// assert!(matches!(even.process(json!(3)), Err(ProcessError::Validation(_))));
/// ```
#[derive(Clone)]
pub struct ValueProcessor {
    inner: Arc<ProcessFn>,
}

impl ValueProcessor {
    /// Wraps a function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ProcessError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// A processor that accepts anything unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::from_fn(Ok)
    }

    /// Runs the processor.
    pub fn process(&self, value: Value) -> Result<Value, ProcessError> {
        (self.inner)(value)
    }
}

impl Default for ValueProcessor {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for ValueProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueProcessor").finish_non_exhaustive()
    }
}
