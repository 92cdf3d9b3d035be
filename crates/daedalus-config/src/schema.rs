//! Configuration section types.

use daedalus_schema::CompilerOptions;
use daedalus_telemetry::{LogConfig, LogFormat, MetricsConfig};
use serde::{Deserialize, Serialize};

/// Logging section.
///
/// ```
/// use daedalus_config::{LogFormat, LoggingSection};
///
/// let section = LoggingSection::default();
/// assert_eq!(section.level, "info");
/// assert_eq!(section.format, LogFormat::Json);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether to install a log subscriber.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default)]
    pub format: LogFormat,

    /// Colour pretty output.
    #[serde(default)]
    pub ansi_enabled: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            ansi_enabled: false,
        }
    }
}

impl LoggingSection {
    /// Expands the section into a full [`LogConfig`].
    ///
    /// Pretty output also turns on span events and file/line info.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let base = match self.format {
            LogFormat::Pretty => LogConfig::development(),
            LogFormat::Json => LogConfig::production(),
        };
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            ansi: self.ansi_enabled,
            ..base
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Schema compiler section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    /// Coerce scalar inputs to the declared type.
    #[serde(default = "default_true")]
    pub coerce_types: bool,

    /// Fill missing properties from `default`.
    #[serde(default = "default_true")]
    pub use_defaults: bool,
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            coerce_types: true,
            use_defaults: true,
        }
    }
}

impl From<SchemaSection> for CompilerOptions {
    fn from(section: SchemaSection) -> Self {
        Self {
            coerce_types: section.coerce_types,
            use_defaults: section.use_defaults,
        }
    }
}

/// Pipeline section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    /// Send client error messages in responses. When unset every error
    /// envelope only carries the status reason phrase.
    #[serde(default)]
    pub expose_error_details: bool,
}

/// Metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Latency histogram buckets in seconds; empty keeps the built-in set.
    #[serde(default)]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: Vec::new(),
        }
    }
}

impl MetricsSection {
    /// Converts into a [`MetricsConfig`].
    #[must_use]
    pub fn to_metrics_config(&self) -> MetricsConfig {
        let mut config = MetricsConfig {
            enabled: self.enabled,
            ..MetricsConfig::default()
        };
        if !self.duration_buckets.is_empty() {
            config.duration_buckets.clone_from(&self.duration_buckets);
        }
        config
    }
}

const fn default_true() -> bool {
    true
}
