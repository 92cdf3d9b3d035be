//! # Daedalus Test
//!
//! In-memory helpers for exercising operation pipelines without a server.
//!
//! [`TestRequest`] builds the `(Request, PathParams)` pair a pipeline
//! consumes, as if a router had already matched the path. [`TestResponse`]
//! collects the response body and offers assertion-friendly accessors.
//!
//! ```
//! use daedalus_test::TestRequest;
//! use serde_json::json;
//!
//! let (request, path_params) = TestRequest::post("/pets/{id}")
//!     .path_param("id", "7")
//!     .query_param("dryRun", "true")
//!     .json(&json!({"name": "Rex"}))
//!     .into_parts()
//!     .unwrap();
//!
//! assert_eq!(request.uri(), "/pets/7?dryRun=true");
//! assert_eq!(request.headers()["content-type"], "application/json");
//! assert_eq!(path_params.get("id"), Some("7"));
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod request;
mod response;

pub use error::TestError;
pub use request::TestRequest;
pub use response::TestResponse;
