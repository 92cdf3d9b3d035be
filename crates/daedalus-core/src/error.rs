//! Error types for Daedalus.
//!
//! Two error families exist:
//!
//! - [`PipelineError`] is raised while a request travels through an operation
//!   pipeline. Client errors (`BadRequest`, `NotFound`, `Unauthorized`,
//!   `Forbidden`) become HTTP responses; `ContractViolation` and `Internal`
//!   are surfaced to the caller of the pipeline.
//! - [`BuildError`] is raised once, while an operation pipeline is being
//!   assembled from its OpenAPI description.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Categories of pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or schema-invalid input.
    BadRequest,
    /// No security requirement was satisfied.
    Unauthorized,
    /// The caller is known but not allowed.
    Forbidden,
    /// A path parameter was missing or invalid.
    NotFound,
    /// The handler broke the response contract (programming error).
    ContractViolation,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ContractViolation | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for categories that are answered with a client error response.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest | Self::Unauthorized | Self::Forbidden | Self::NotFound
        )
    }

    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::ContractViolation => "contract_violation",
            Self::Internal => "internal",
        }
    }
}

/// Errors raised while a request runs through an operation pipeline.
///
/// # Example
///
/// ```
/// use daedalus_core::{ErrorCategory, PipelineError};
///
/// let error = PipelineError::bad_request("Request body is required.");
/// assert_eq!(error.category(), ErrorCategory::BadRequest);
/// assert_eq!(error.status_code(), 400);
/// ```
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The request is malformed or fails schema validation.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Client-facing message.
        message: String,
    },

    /// A path parameter is missing or invalid, so the resource does not exist.
    #[error("Not found")]
    NotFound,

    /// No security requirement of the operation was satisfied.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Client-facing message.
        message: String,
    },

    /// A security handler rejected an identified caller.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Client-facing message.
        message: String,
    },

    /// The handler produced a result the pipeline cannot deliver.
    #[error("{message}")]
    ContractViolation {
        /// Display name of the operation at fault.
        operation: String,
        /// Description of the violation, naming the operation.
        message: String,
    },

    /// Unexpected failure, propagated unchanged.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PipelineError {
    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub const fn not_found() -> Self {
        Self::NotFound
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a contract violation for an operation.
    #[must_use]
    pub fn contract_violation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContractViolation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::BadRequest { .. } => ErrorCategory::BadRequest,
            Self::NotFound => ErrorCategory::NotFound,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::Forbidden { .. } => ErrorCategory::Forbidden,
            Self::ContractViolation { .. } => ErrorCategory::ContractViolation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns `true` if this error should be answered with a client error response.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.category().is_client_error()
    }

    /// Returns `true` for programming errors that must never be swallowed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ContractViolation { .. })
    }

    /// The message a client is allowed to see.
    ///
    /// Client errors carry their own message; server-side errors only ever
    /// expose the canonical reason phrase.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message } => message.clone(),
            _ => self
                .status_code()
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
        }
    }

    /// Converts this error to a serializable error envelope.
    ///
    /// With `expose_details` unset every message collapses to the canonical
    /// reason phrase of the status code.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>, expose_details: bool) -> ErrorEnvelope {
        let message = if expose_details {
            self.client_message()
        } else {
            self.status_code()
                .canonical_reason()
                .unwrap_or("Error")
                .to_string()
        };
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                category: self.category(),
                details: None,
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::ContractViolation { .. } => "CONTRACT_VIOLATION",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Boxed error type carried by [`BuildError`] compile failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while assembling an operation pipeline.
///
/// These are configuration errors: they abort startup rather than being
/// answered per request.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A parameter schema `$ref` does not resolve inside the document.
    #[error(
        "Could not resolve parameter schema reference for parameter {parameter} in operation {operation}."
    )]
    UnresolvedParameterSchema {
        /// Operation display name.
        operation: String,
        /// Parameter name.
        parameter: String,
    },

    /// A request body schema `$ref` does not resolve inside the document.
    #[error(
        "Could not resolve requestBody schema reference for content type {content_type} in operation {operation}."
    )]
    UnresolvedBodySchema {
        /// Operation display name.
        operation: String,
        /// Declared media type.
        content_type: String,
    },

    /// The schema compiler rejected a parameter schema.
    #[error("Failed to compile schema for parameter {location} {parameter}: {source}")]
    ParameterSchema {
        /// Operation display name.
        operation: String,
        /// Parameter location (`path`, `query`, ...).
        location: String,
        /// Parameter name.
        parameter: String,
        /// Compiler failure.
        #[source]
        source: BoxError,
    },

    /// The schema compiler rejected a request body schema.
    #[error("Failed to compile schema for body {content_type}: {source}")]
    BodySchema {
        /// Operation display name.
        operation: String,
        /// Declared media type.
        content_type: String,
        /// Compiler failure.
        #[source]
        source: BoxError,
    },

    /// A security requirement names a scheme nobody registered a handler for.
    #[error("Operation {operation} requires security scheme {scheme}, but no handler is registered for it.")]
    UnknownSecurityScheme {
        /// Operation display name.
        operation: String,
        /// Scheme name.
        scheme: String,
    },

    /// A handler argument binding points at something the operation does not declare.
    #[error("Operation {operation} has an invalid argument binding: {message}")]
    InvalidBinding {
        /// Operation display name.
        operation: String,
        /// What is wrong with the binding.
        message: String,
    },

    /// Two registered operations share a display name.
    #[error("Operation {operation} is registered more than once.")]
    DuplicateOperation {
        /// Operation display name.
        operation: String,
    },

    /// The OpenAPI operation object could not be read.
    #[error("Operation {operation} could not be read from the document: {source}")]
    InvalidOperation {
        /// Operation display name.
        operation: String,
        /// Deserialization failure.
        #[source]
        source: serde_json::Error,
    },
}

impl BuildError {
    /// Display name of the operation the error belongs to.
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::UnresolvedParameterSchema { operation, .. }
            | Self::UnresolvedBodySchema { operation, .. }
            | Self::ParameterSchema { operation, .. }
            | Self::BodySchema { operation, .. }
            | Self::UnknownSecurityScheme { operation, .. }
            | Self::InvalidBinding { operation, .. }
            | Self::DuplicateOperation { operation }
            | Self::InvalidOperation { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let error = PipelineError::bad_request("Query parameter \"id\" is required.");
        assert_eq!(error.category(), ErrorCategory::BadRequest);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.is_client_error());
        assert_eq!(error.client_message(), "Query parameter \"id\" is required.");
    }

    #[test]
    fn test_not_found_hides_details() {
        let error = PipelineError::not_found();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.client_message(), "Not Found");
    }

    #[test]
    fn test_contract_violation_is_fatal() {
        let error = PipelineError::contract_violation(
            "getUser",
            "Operation getUser handler returned a result but the request has already sent its headers.",
        );
        assert!(error.is_fatal());
        assert!(!error.is_client_error());
        assert!(error.to_string().contains("getUser"));
    }

    #[test]
    fn test_internal_from_anyhow() {
        let error: PipelineError = anyhow::anyhow!("database unavailable").into();
        assert_eq!(error.category(), ErrorCategory::Internal);
        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(error.client_message(), "Internal Server Error");
    }

    #[test]
    fn test_error_envelope_serialization() {
        let error = PipelineError::bad_request("Request body is required.");
        let envelope = error.to_envelope(Some("req-456"), true);

        let json = serde_json::to_string(&envelope).expect("serialization should work");
        assert!(json.contains("\"code\":\"BAD_REQUEST\""));
        assert!(json.contains("\"request_id\":\"req-456\""));
        assert!(json.contains("\"category\":\"bad_request\""));
        assert!(json.contains("Request body is required."));
    }

    #[test]
    fn test_error_envelope_without_details() {
        let error = PipelineError::bad_request("Body parameter \"secret\" is invalid");
        let envelope = error.to_envelope(None, false);
        assert_eq!(envelope.error.message, "Bad Request");
        assert!(envelope.request_id.is_none());
    }

    #[test]
    fn test_all_error_categories_have_status_codes() {
        let categories = [
            ErrorCategory::BadRequest,
            ErrorCategory::Unauthorized,
            ErrorCategory::Forbidden,
            ErrorCategory::NotFound,
            ErrorCategory::ContractViolation,
            ErrorCategory::Internal,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
            assert_eq!(category.is_client_error(), status.is_client_error());
        }
    }

    #[test]
    fn test_build_error_messages() {
        let error = BuildError::UnresolvedParameterSchema {
            operation: "getUser".to_string(),
            parameter: "id".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Could not resolve parameter schema reference for parameter id in operation getUser."
        );
        assert_eq!(error.operation(), "getUser");

        let error = BuildError::BodySchema {
            operation: "createUser".to_string(),
            content_type: "application/json".to_string(),
            source: "unknown type \"strng\"".into(),
        };
        assert!(error
            .to_string()
            .starts_with("Failed to compile schema for body application/json: "));
    }
}
