//! Handler outcomes.

use crate::response::HandlerResult;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;

/// What a handler (or a stage further down the chain) hands back.
///
/// Response-shaping stages consume the variants they understand and return
/// [`Outcome::Nothing`] once the response has been written.
pub enum Outcome {
    /// Nothing to send; the response was written directly or is empty.
    Nothing,
    /// A JSON value to send with status 200.
    Json(Value),
    /// A full response description.
    Shaped(HandlerResult),
    /// Anything else; only a custom stage can turn this into a response.
    Other(Box<dyn Any + Send>),
}

impl Outcome {
    /// Serializes a value into a JSON outcome.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    /// Wraps an arbitrary value.
    #[must_use]
    pub fn other<T: Any + Send>(value: T) -> Self {
        Self::Other(Box::new(value))
    }

    /// Returns `true` for [`Outcome::Nothing`].
    #[must_use]
    pub const fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Json(_) => "json",
            Self::Shaped(_) => "handler_result",
            Self::Other(_) => "other",
        }
    }

    /// Takes the value out of [`Outcome::Other`] if it has type `T`.
    pub fn downcast_other<T: Any>(self) -> Result<T, Self> {
        match self {
            Self::Other(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(Self::Other(boxed)),
            },
            other => Err(other),
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("Nothing"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Shaped(result) => f.debug_tuple("Shaped").field(result).finish(),
            Self::Other(_) => f.write_str("Other(..)"),
        }
    }
}

impl From<()> for Outcome {
    fn from((): ()) -> Self {
        Self::Nothing
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<HandlerResult> for Outcome {
    fn from(result: HandlerResult) -> Self {
        Self::Shaped(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct User {
        id: u32,
    }

    #[test]
    fn test_json_from_serializable() {
        let outcome = Outcome::json(&User { id: 7 }).unwrap();
        match outcome {
            Outcome::Json(value) => assert_eq!(value, json!({"id": 7})),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_downcast_other() {
        let outcome = Outcome::other(42_u8);
        assert_eq!(outcome.kind(), "other");
        let outcome = outcome.downcast_other::<String>().unwrap_err();
        assert_eq!(outcome.downcast_other::<u8>().unwrap(), 42);
    }

    #[test]
    fn test_conversions() {
        assert!(Outcome::from(()).is_nothing());
        assert_eq!(Outcome::from(json!(1)).kind(), "json");
        assert_eq!(Outcome::from(HandlerResult::new()).kind(), "handler_result");
    }
}
