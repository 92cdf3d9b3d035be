//! # Daedalus Middleware
//!
//! The per-operation request pipeline.
//!
//! Each operation gets its own [`OperationPipeline`], assembled once at
//! startup from the operation's OpenAPI description. Schemas are resolved and
//! compiled while building, so a broken document fails startup rather than
//! requests.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Security → Parameters → Body → JsonResponse → HandlerResult → [custom] → Handler
//!                                               ↑               ↑                      ↓
//!                                               └───────────────┴──── outcome ─────────┘
//! ```
//!
//! | Stage | Middleware     | Purpose                                           |
//! |-------|----------------|---------------------------------------------------|
//! | 1     | Security       | `401` unless a security requirement is satisfied  |
//! | 2     | Parameters     | Validate and coerce path/query/header/cookie      |
//! | 3     | Body           | Pick a schema by `Content-Type`, validate, coerce |
//! | 4     | JSON response  | Write plain JSON results as `200`                 |
//! | 5     | Handler result | Apply explicit [`HandlerResult`](daedalus_core::HandlerResult)s |
//! | 6     | Invocation     | Resolve argument bindings, call the handler       |
//!
//! Any stage may short-circuit by returning without running the rest of the
//! chain. Client errors (`400`, `401`, `404`) come back as
//! [`PipelineError`](daedalus_core::PipelineError)s for the caller to render;
//! contract violations are fatal.
//!
//! ## Example
//!
//! ```
//! use daedalus_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 6);
//! assert_eq!(stages[0].name(), "security");
//! assert_eq!(stages[5].name(), "invocation");
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use middleware::{BoxedMiddleware, FnMiddleware, Middleware, Next, StepResult};
pub use pipeline::{FactoryContext, OperationPipeline, PipelineOptions, Stage};
pub use stages::{security_fn, FnSecurityScheme, SecuritySchemeHandler};
pub use types::{Request, Response, ResponseExt};
