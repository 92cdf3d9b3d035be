//! The root configuration type.

use daedalus_schema::CompilerOptions;
use daedalus_telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, LoggingSection, MetricsSection, PipelineSection, SchemaSection};

/// Complete Daedalus configuration.
///
/// ```
/// use daedalus_config::DaedalusConfig;
///
/// let config = DaedalusConfig::default();
/// assert_eq!(config.service_name, "daedalus");
/// assert!(config.schema.coerce_types);
/// assert!(!config.pipeline.expose_error_details);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DaedalusConfig {
    /// Service name attached to logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Schema compiler options.
    #[serde(default)]
    pub schema: SchemaSection,

    /// Request pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineSection,
}

impl Default for DaedalusConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSection::default(),
            metrics: MetricsSection::default(),
            schema: SchemaSection::default(),
            pipeline: PipelineSection::default(),
        }
    }
}

fn default_service_name() -> String {
    "daedalus".to_string()
}

impl DaedalusConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - `service_name` is blank
    /// - `logging.level` is blank while logging is enabled
    /// - a metrics bucket is not a positive finite number, or buckets are
    ///   not strictly increasing
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value("service_name", "must not be empty"));
        }

        if self.logging.enabled && self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "logging.level",
                "must not be empty when logging is enabled",
            ));
        }

        let buckets = &self.metrics.duration_buckets;
        if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(ConfigError::invalid_value(
                "metrics.duration_buckets",
                "buckets must be positive numbers",
            ));
        }
        if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::invalid_value(
                "metrics.duration_buckets",
                "buckets must be strictly increasing",
            ));
        }

        Ok(())
    }

    /// Local development preset: pretty, coloured `debug` logs and detailed
    /// error responses.
    ///
    /// ```
    /// use daedalus_config::{DaedalusConfig, LogFormat};
    ///
    /// let config = DaedalusConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert_eq!(config.logging.format, LogFormat::Pretty);
    /// assert!(config.pipeline.expose_error_details);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingSection {
                enabled: true,
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                ansi_enabled: true,
            },
            pipeline: PipelineSection {
                expose_error_details: true,
            },
            ..Self::default()
        }
    }

    /// Production preset: JSON `info` logs, error details withheld.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LoggingSection {
                enabled: true,
                level: "info".to_string(),
                format: LogFormat::Json,
                ansi_enabled: false,
            },
            pipeline: PipelineSection {
                expose_error_details: false,
            },
            ..Self::default()
        }
    }

    /// Options for the schema compiler.
    #[must_use]
    pub fn compiler_options(&self) -> CompilerOptions {
        self.schema.into()
    }

    /// Settings for [`init_telemetry`](daedalus_telemetry::init_telemetry).
    #[must_use]
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            logging: self.logging.to_log_config(),
            metrics: self.metrics.to_metrics_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DaedalusConfig::default().validate().is_ok());
        assert!(DaedalusConfig::development().validate().is_ok());
        assert!(DaedalusConfig::production().validate().is_ok());
    }

    #[test]
    fn test_validate_service_name() {
        let config = DaedalusConfig {
            service_name: "  ".to_string(),
            ..DaedalusConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("service_name"));
    }

    #[test]
    fn test_validate_log_level_only_when_enabled() {
        let mut config = DaedalusConfig::default();
        config.logging.level = String::new();
        assert!(config.validate().is_err());

        config.logging.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_buckets() {
        let mut config = DaedalusConfig::default();
        config.metrics.duration_buckets = vec![0.5, 0.1];
        assert!(config.validate().is_err());

        config.metrics.duration_buckets = vec![-1.0];
        assert!(config.validate().is_err());

        config.metrics.duration_buckets = vec![0.1, 0.5];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compiler_options_follow_schema_section() {
        let mut config = DaedalusConfig::default();
        config.schema.use_defaults = false;
        let options = config.compiler_options();
        assert!(options.coerce_types);
        assert!(!options.use_defaults);
    }

    #[test]
    fn test_telemetry_conversion() {
        let telemetry = DaedalusConfig::development().telemetry();
        assert_eq!(telemetry.logging.level, "debug");
        assert!(telemetry.logging.ansi);
        assert!(telemetry.metrics.enabled);
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let result: Result<DaedalusConfig, _> = toml::from_str("[server]\nport = 1\n");
        assert!(result.is_err());
    }
}
