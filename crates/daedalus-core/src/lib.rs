//! # Daedalus Core
//!
//! Core types shared by every stage of the Daedalus operation pipeline.
//!
//! - [`OperationSpec`] - the per-operation slice of an OpenAPI document
//! - [`RequestContext`] - per-request state flowing through the pipeline
//! - [`ResponseWriter`] / [`HandlerResult`] - response construction
//! - [`Outcome`] - the value a handler (or stage) hands back up the chain
//! - [`PipelineError`] / [`BuildError`] - request-time and build-time errors
//! - [`OperationHandler`] - the trait operation handlers implement

#![doc(html_root_url = "https://docs.rs/daedalus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod handler;
pub mod media_type;
pub mod operation;
mod outcome;
pub mod request;
mod response;

pub use context::{RequestContext, RequestDataKey, RequestId, REQUEST_ID_HEADER};
pub use error::{
    BoxError, BuildError, ErrorCategory, ErrorDetail, ErrorEnvelope, PipelineError,
    PipelineResult,
};
pub use handler::{handler_fn, Arguments, BoxFuture, FnHandler, OperationHandler};
pub use operation::{
    ArgumentBinding, MediaTypeSpec, OperationSpec, OperationSpecBuilder, ParameterLocation,
    ParameterSpec, RequestBodySpec, SecurityRequirement,
};
pub use outcome::Outcome;
pub use request::{Cookies, PathParams, QueryParams, Request, Response};
pub use response::{HandlerResult, ResponseWriter, SameSite, SetCookie};
