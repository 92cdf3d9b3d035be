//! # Daedalus
//!
//! Per-operation request pipelines for OpenAPI services.
//!
//! Each operation declared in an OpenAPI document gets a fixed chain of
//! stages built once at startup: security checks, parameter and body
//! validation with type coercion, then response shaping around the handler.
//! Routing is left to the host; Daedalus is handed the operation name and
//! the already-matched path parameters.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use daedalus::prelude::*;
//! use serde_json::json;
//!
//! let document: serde_json::Value = serde_json::from_str(OPENAPI)?;
//! let operations = OperationRegistry::new(document)
//!     .register_openapi(
//!         Method::GET,
//!         "/pets/{id}",
//!         [ArgumentBinding::parameter("id")],
//!         handler_fn(|_ctx, args| {
//!             let id = args.get(0).cloned();
//!             Box::pin(async move { Ok(Outcome::Json(json!({ "id": id }))) })
//!         }),
//!     )
//!     .build(&DaedalusConfig::production())?;
//!
//! let response = operations.dispatch("getPet", request, path_params).await?;
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! Request → Security → Parameters → Body → JSON responder → Handler-result responder
//!                                                              → custom middleware → Handler
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod registry;

pub use registry::{OperationRegistry, Operations};

pub use daedalus_config as config;
pub use daedalus_core as core;
pub use daedalus_middleware as middleware;
pub use daedalus_schema as schema;
pub use daedalus_telemetry as telemetry;

/// Common imports.
///
/// ```rust,ignore
/// use daedalus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::registry::{OperationRegistry, Operations};

    pub use daedalus_config::{ConfigLoader, DaedalusConfig};
    pub use daedalus_core::{
        handler_fn, Arguments, ArgumentBinding, BuildError, HandlerResult, OperationHandler,
        OperationSpec, Outcome, ParameterLocation, ParameterSpec, PathParams, PipelineError,
        PipelineResult, Request, RequestBodySpec, RequestContext, Response, SetCookie,
    };
    pub use daedalus_middleware::{security_fn, FnMiddleware, Middleware, Next, ResponseExt};
    pub use http::{Method, StatusCode};
}
