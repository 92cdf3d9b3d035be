//! Layered configuration loading.
//!
//! Layers are applied in order, later ones overriding earlier ones:
//! 1. Defaults or a preset
//! 2. Files and strings (TOML or JSON), merged key by key
//! 3. `PREFIX__SECTION__KEY` environment variables

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::{ConfigError, DaedalusConfig, LogFormat};

/// Configuration loader.
///
/// ```
/// use daedalus_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_development()
///     .with_string("[schema]\ncoerce_types = false\n", "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.logging.level, "debug");
/// assert!(!config.schema.coerce_types);
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: DaedalusConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: DaedalusConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = DaedalusConfig::default();
        self
    }

    /// Reset to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = DaedalusConfig::development();
        self
    }

    /// Reset to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = DaedalusConfig::production();
        self
    }

    /// Merge a configuration file; the format follows the extension
    /// (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist or cannot be read
    /// - The extension is not `toml` or `json`
    /// - The content does not parse, or contains unknown fields
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.with_string(&content, &format)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merge configuration from a string in the given format
    /// (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unknown or parsing fails.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => {
                toml::from_str::<DaedalusConfig>(content)?;
                toml::from_str(content)?
            }
            "json" => {
                serde_json::from_str::<DaedalusConfig>(content)?;
                serde_json::from_str(content)?
            }
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        self.merge(layer)?;
        Ok(self)
    }

    /// Apply `PREFIX__SECTION__KEY` environment overrides when loading.
    ///
    /// With prefix `DAEDALUS`:
    /// - `DAEDALUS__SERVICE_NAME=pets`
    /// - `DAEDALUS__LOGGING__LEVEL=debug`
    /// - `DAEDALUS__PIPELINE__EXPOSE_ERROR_DETAILS=true`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the current directory or its
    /// parents, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dotenv`] if a file is found but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation
    /// fails.
    pub fn load(self) -> Result<DaedalusConfig, ConfigError> {
        let config = self.load_unvalidated_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Return the configuration built so far, without environment overrides
    /// or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> DaedalusConfig {
        self.config
    }

    fn load_unvalidated_with_env(mut self) -> Result<DaedalusConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(key, _)| key.starts_with(&format!("{prefix}__")))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }
        Ok(self.config)
    }

    fn merge(&mut self, layer: Value) -> Result<(), ConfigError> {
        let mut current = serde_json::to_value(&self.config)?;
        merge_values(&mut current, layer);
        self.config = serde_json::from_value(current)?;
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
        let parts: Vec<&str> = path.split("__").collect();

        let config = &mut self.config;
        match parts.as_slice() {
            ["SERVICE_NAME"] => config.service_name = value.to_string(),

            ["LOGGING", "ENABLED"] => config.logging.enabled = env_bool(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => config.logging.ansi_enabled = env_bool(key, value)?,

            ["METRICS", "ENABLED"] => config.metrics.enabled = env_bool(key, value)?,
            ["METRICS", "DURATION_BUCKETS"] => {
                config.metrics.duration_buckets = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<f64>().map_err(|_| {
                            ConfigError::env_parse_error(key, "expected comma-separated numbers")
                        })
                    })
                    .collect::<Result<Vec<f64>, ConfigError>>()?;
            }

            ["SCHEMA", "COERCE_TYPES"] => config.schema.coerce_types = env_bool(key, value)?,
            ["SCHEMA", "USE_DEFAULTS"] => config.schema.use_defaults = env_bool(key, value)?,

            ["PIPELINE", "EXPOSE_ERROR_DETAILS"] => {
                config.pipeline.expose_error_details = env_bool(key, value)?;
            }

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }

        Ok(())
    }
}

/// Deep-merges `layer` into `base`: objects merge key by key, anything else
/// replaces.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
