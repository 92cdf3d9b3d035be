//! Prometheus metrics for operation pipelines.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `daedalus_pipeline_requests_total` | Counter | `operation`, `outcome` | Requests run through a pipeline |
//! | `daedalus_pipeline_duration_seconds` | Histogram | `operation` | Pipeline latency |
//! | `daedalus_validation_failures_total` | Counter | `operation`, `target` | Rejected parameters and bodies |
//!
//! Recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade drops samples until a recorder is installed.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Request counter name.
pub const REQUESTS_TOTAL: &str = "daedalus_pipeline_requests_total";

/// Latency histogram name.
pub const DURATION_SECONDS: &str = "daedalus_pipeline_duration_seconds";

/// Validation failure counter name.
pub const VALIDATION_FAILURES_TOTAL: &str = "daedalus_validation_failures_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to install a recorder at all.
    pub enabled: bool,

    /// Histogram buckets for pipeline latency, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ],
        }
    }
}

/// Installs the global Prometheus recorder and returns its render handle.
///
/// Calling this a second time returns the handle of the first call.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] if another recorder is already
/// installed, or [`TelemetryError::InvalidConfig`] for unusable buckets.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(Some(handle.clone()));
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle.clone());
    describe_metrics();
    Ok(Some(handle))
}

/// Renders all metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(
        REQUESTS_TOTAL,
        "Requests run through an operation pipeline, by outcome"
    );
    describe_histogram!(
        DURATION_SECONDS,
        "Time spent in an operation pipeline, in seconds"
    );
    describe_counter!(
        VALIDATION_FAILURES_TOTAL,
        "Parameters and bodies rejected by schema validation"
    );
}

/// Records one pipeline run.
///
/// `outcome` is `ok` or an error category label such as `bad_request`.
pub fn record_pipeline_request(operation: &str, outcome: &'static str, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(DURATION_SECONDS, "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

/// Records a schema validation rejection.
///
/// `target` is a parameter location (`path`, `query`, ...) or `body`.
pub fn record_validation_failure(operation: &str, target: &'static str) {
    counter!(
        VALIDATION_FAILURES_TOTAL,
        "operation" => operation.to_string(),
        "target" => target
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.duration_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disabled_metrics_install_nothing() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        assert!(init_metrics(&config).unwrap().is_none());
    }

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_pipeline_request("getUser", "ok", Duration::from_millis(3));
        record_validation_failure("getUser", "query");
    }

    #[test]
    fn test_init_metrics_renders_recorded_samples() {
        let handle = init_metrics(&MetricsConfig::default()).unwrap();
        assert!(handle.is_some());
        assert!(init_metrics(&MetricsConfig::default()).unwrap().is_some());

        record_pipeline_request("listPets", "bad_request", Duration::from_millis(1));
        let rendered = render_metrics().unwrap();
        assert!(rendered.contains(REQUESTS_TOTAL));
        assert!(rendered.contains("operation=\"listPets\""));
        assert!(rendered.contains("outcome=\"bad_request\""));
    }
}
