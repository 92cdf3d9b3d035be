//! The fixed pipeline stages.
//!
//! | Order | Stage | Purpose |
//! |-------|-------|---------|
//! | 1 | [`security`] | Short-circuit unless a security requirement is satisfied |
//! | 2 | [`parameters`] | Extract, validate and coerce declared parameters |
//! | 3 | [`body`] | Pick the body schema by `Content-Type`, validate and coerce |
//! | 4 | [`json_response`] | Write plain JSON results as `200 application/json` |
//! | 5 | [`handler_result`] | Apply a returned [`HandlerResult`](daedalus_core::HandlerResult) |
//! | 6 | [`invocation`] | Resolve argument bindings and call the handler |
//!
//! The two shaping stages wrap the invocation, so the handler-result stage
//! sees the raw handler outcome first and the JSON stage only sees what it
//! passed through.

pub mod body;
pub mod handler_result;
pub mod invocation;
pub mod json_response;
pub mod parameters;
pub mod security;

pub use body::BodyStage;
pub use handler_result::HandlerResultStage;
pub use invocation::HandlerInvocation;
pub use json_response::JsonResponseStage;
pub use parameters::ParametersStage;
pub use security::{security_fn, FnSecurityScheme, SecuritySchemeHandler, SecurityStage};
