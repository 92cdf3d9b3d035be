//! # Daedalus Telemetry
//!
//! Logging and metrics for Daedalus operation pipelines.
//!
//! - **Logging**: `tracing-subscriber` with an env filter, JSON or pretty
//! - **Metrics**: Prometheus text format via the `metrics` facade
//!
//! The pipeline records through [`crate::metrics::record_pipeline_request`] and
//! logs with the field names in [`logging::fields`]; neither requires
//! telemetry to be initialised.
//!
//! ```rust,ignore
//! use daedalus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let handle = init_telemetry(&TelemetryConfig::default())?;
//! // later, from a /metrics route
//! let body = handle.map(|h| h.render());
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::error::TelemetryError;
pub use crate::logging::{init_logging, LogConfig, LogFormat};
pub use crate::metrics::{init_metrics, render_metrics, MetricsConfig};
pub use metrics_exporter_prometheus::PrometheusHandle;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Combined telemetry settings.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Log subscriber settings.
    pub logging: LogConfig,
    /// Metrics recorder settings.
    pub metrics: MetricsConfig,
}

/// Initializes logging, then metrics.
///
/// Returns the Prometheus handle when metrics are enabled.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Option<PrometheusHandle>> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)
}
