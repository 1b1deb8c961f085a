//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults
//! 2. An optional TOML file (`PILGRIM_CONFIG` or the platform config dir)
//! 3. Environment overrides such as `PILGRIM__TRACKER__MAX_ACCEPTABLE_ACCURACY_M=30`
//!
//! # Example
//!
//! ```toml
//! [tracker]
//! max_acceptable_accuracy_m = 50.0
//! min_movement_threshold_m = 10.0
//!
//! [visits]
//! max_entries = 100
//!
//! [server]
//! port = 3000
//!
//! [sites]
//! catalog_path = "/etc/pilgrim/sites.toml"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::EARTH_RADIUS_M;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "PILGRIM_CONFIG";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PILGRIM";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The layered sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A single field failed validation.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("Configuration has {} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilgrimConfig {
    /// Proximity tracking thresholds.
    pub tracker: TrackerConfig,

    /// Visit history settings.
    pub visits: VisitsConfig,

    /// HTTP server settings.
    pub server: ServerConfig,

    /// Site catalog settings.
    pub sites: SitesConfig,
}

/// Thresholds used by the proximity tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fixes with a larger accuracy radius (metres) are discarded.
    pub max_acceptable_accuracy_m: f64,

    /// Fixes closer than this (metres) to the last accepted fix are discarded.
    pub min_movement_threshold_m: f64,

    /// Sphere radius used for distance computation.
    pub earth_radius_m: f64,

    /// Search radius for nearby-site queries.
    pub nearby_radius_m: f64,

    /// Radius given to catalog sites that do not declare one.
    pub default_zone_radius_m: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_acceptable_accuracy_m: 50.0,
            min_movement_threshold_m: 10.0,
            earth_radius_m: EARTH_RADIUS_M,
            nearby_radius_m: 5_000.0,
            default_zone_radius_m: 100.0,
        }
    }
}

/// Visit history settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitsConfig {
    /// Number of visit records kept; older records are dropped.
    pub max_entries: usize,

    /// Directory holding `visits.json`. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for VisitsConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            data_dir: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Site catalog settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    /// TOML file listing the monitored sites.
    pub catalog_path: Option<PathBuf>,
}

impl PilgrimConfig {
    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// With `path` set the file must exist. Without it, `PILGRIM_CONFIG` is
    /// consulted, then the platform config directory; a missing default file
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, a source cannot be
    /// parsed, or the result fails validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let (file, required) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(p) => (Some(PathBuf::from(p)), true),
                None => (default_config_path(), false),
            },
        };

        let mut builder = ::config::Config::builder();
        if let Some(file) = file {
            if required && !file.exists() {
                return Err(ConfigError::NotFound(file.display().to_string()));
            }
            builder = builder.add_source(::config::File::from(file).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from_str(content, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every field, collecting all errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let t = &self.tracker;

        check_positive(
            &mut errors,
            "tracker.max_acceptable_accuracy_m",
            t.max_acceptable_accuracy_m,
        );
        if !t.min_movement_threshold_m.is_finite() || t.min_movement_threshold_m < 0.0 {
            errors.push(invalid(
                "tracker.min_movement_threshold_m",
                "must be a non-negative number",
            ));
        }
        check_positive(&mut errors, "tracker.earth_radius_m", t.earth_radius_m);
        check_positive(&mut errors, "tracker.nearby_radius_m", t.nearby_radius_m);
        check_positive(&mut errors, "tracker.default_zone_radius_m", t.default_zone_radius_m);

        if self.visits.max_entries == 0 {
            errors.push(invalid("visits.max_entries", "must be at least 1"));
        }
        if self.server.host.trim().is_empty() {
            errors.push(invalid("server.host", "must not be empty"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Directory where persistent data lives.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.visits
            .data_dir
            .clone()
            .unwrap_or_else(crate::storage::default_data_dir)
    }
}

/// Platform-specific default config file location.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pilgrim")
        .map(|dirs| dirs.config_dir().join("pilgrim.toml"))
}

fn check_positive(errors: &mut Vec<ConfigError>, field: &str, value: f64) {
    if !value.is_finite() || value <= 0.0 {
        errors.push(invalid(field, "must be a positive number"));
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}
