//! Schema error types.

use std::fmt;
use thiserror::Error;

/// Errors raised while compiling a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A schema is neither an object nor a boolean.
    #[error("schema at {path} must be an object or a boolean")]
    InvalidSchema {
        /// JSON pointer of the offending schema.
        path: String,
    },

    /// The schema was rejected by the validator, usually because a keyword
    /// has a value of the wrong shape.
    #[error("invalid schema: {message}")]
    Invalid {
        /// What the validator reported.
        message: String,
    },

    /// A `$ref` does not resolve inside the document.
    #[error("can't resolve reference {reference} from {path}")]
    UnresolvedReference {
        /// JSON pointer of the schema holding the reference.
        path: String,
        /// The reference itself.
        reference: String,
    },

    /// A `$ref` leads back to itself without descending into the value.
    #[error("reference {reference} is circular")]
    CircularReference {
        /// The reference at which the cycle was detected.
        reference: String,
    },

    /// Raised by a custom [`CompileSchema`](crate::CompileSchema) implementation.
    #[error("{0}")]
    Custom(String),
}

/// One reason a value failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON pointer to the failing part of the value; empty for the root.
    pub instance_path: String,
    /// The schema keyword that failed.
    pub keyword: &'static str,
    /// Human-readable description, e.g. `must be integer`.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{} {}", self.instance_path, self.message)
        }
    }
}

/// A value did not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Creates a failure from its issues.
    #[must_use]
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Creates a failure with a single issue at the root.
    #[must_use]
    pub fn single(keyword: &'static str, message: impl Into<String>) -> Self {
        Self::new(vec![ValidationIssue {
            instance_path: String::new(),
            keyword,
            message: message.into(),
        }])
    }

    /// All issues, in the order they were found.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return f.write_str("value is invalid");
        }
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// Error returned by a [`ValueProcessor`](crate::ValueProcessor).
///
/// Only `Validation` is turned into a client error by the pipeline; anything
/// else is propagated unchanged.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The value does not satisfy the schema.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// The processor failed for another reason.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    /// Returns the validation failure, if that is what this is.
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(failure) => Some(failure),
            Self::Other(_) => None,
        }
    }
}
