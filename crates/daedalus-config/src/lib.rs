//! Typed configuration for Daedalus.
//!
//! - TOML and JSON files, merged over defaults key by key
//! - `PREFIX__SECTION__KEY` environment overrides and `.env` files
//! - Strict parsing: unknown fields are errors
//!
//! ```toml
//! service_name = "pets"
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! ansi_enabled = false
//!
//! [metrics]
//! enabled = true
//!
//! [schema]
//! coerce_types = true
//! use_defaults = true
//!
//! [pipeline]
//! expose_error_details = false
//! ```
//!
//! ```no_run
//! use daedalus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), daedalus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("daedalus.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("DAEDALUS")
//!     .load()?;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::DaedalusConfig;
pub use daedalus_telemetry::LogFormat;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LoggingSection, MetricsSection, PipelineSection, SchemaSection};
