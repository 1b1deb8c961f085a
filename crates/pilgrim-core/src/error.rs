//! Unified error types for the pilgrim core library.
//!
//! This module provides a unified error type [`PilgrimError`] that covers all
//! failure modes across the pilgrim system. Each module also has its own
//! specific error type (TrackerError, ConfigError, CatalogError, VisitError)
//! for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use pilgrim_core::error::{PilgrimError, Result};
//!
//! fn require_zone(id: &str, known: &[&str]) -> Result<()> {
//!     if !known.contains(&id) {
//!         return Err(PilgrimError::ZoneNotFound(id.to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_zone("rumtek", &["rumtek"]).is_ok());
//! ```

use thiserror::Error;

/// The unified error type for all pilgrim operations.
#[derive(Debug, Error)]
pub enum PilgrimError {
    // =========================================================================
    // TRACKER ERRORS
    // =========================================================================
    /// A zone with this id is already registered.
    #[error("Zone '{0}' is already registered. Remove it first or choose another id.")]
    DuplicateZone(String),

    /// No zone with this id is registered.
    #[error("Zone not found: '{0}'")]
    ZoneNotFound(String),

    /// A zone definition was rejected.
    #[error("Invalid zone: {0}")]
    InvalidZone(String),

    /// A position report was malformed.
    #[error("Invalid position fix: {0}")]
    InvalidFix(String),

    /// The location provider could not start a watch.
    #[error("Location provider unavailable: {0}")]
    ProviderUnavailable(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {0}")]
    ConfigNotFound(String),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// The site catalog could not be loaded.
    #[error("Site catalog error: {0}")]
    CatalogError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for pilgrim operations.
pub type Result<T> = std::result::Result<T, PilgrimError>;

impl PilgrimError {
    /// Returns `true` if this error comes from zone or fix handling.
    #[inline]
    #[must_use]
    pub const fn is_tracker_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateZone(_)
                | Self::ZoneNotFound(_)
                | Self::InvalidZone(_)
                | Self::InvalidFix(_)
                | Self::ProviderUnavailable(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigParseError(_)
                | Self::ConfigValidationError(_)
                | Self::CatalogError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::PersistenceError(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidZone(_) | Self::InvalidFix(_) => 400,

            // 404 Not Found
            Self::ZoneNotFound(_) | Self::ConfigNotFound(_) => 404,

            // 409 Conflict
            Self::DuplicateZone(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) | Self::CatalogError(_) => {
                422
            }

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - location source missing
            Self::ProviderUnavailable(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateZone(_) => "DUPLICATE_ZONE",
            Self::ZoneNotFound(_) => "ZONE_NOT_FOUND",
            Self::InvalidZone(_) => "INVALID_ZONE",
            Self::InvalidFix(_) => "INVALID_FIX",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::CatalogError(_) => "CATALOG_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::tracker::TrackerError> for PilgrimError {
    fn from(err: crate::tracker::TrackerError) -> Self {
        use crate::provider::ProviderError;
        use crate::tracker::TrackerError;
        match err {
            TrackerError::DuplicateZone { id } => Self::DuplicateZone(id),
            TrackerError::InvalidZone { id, reason } => {
                Self::InvalidZone(format!("{id}: {reason}"))
            }
            TrackerError::InvalidFix { reason } => Self::InvalidFix(reason),
            TrackerError::Provider(ProviderError::Unavailable { message }) => {
                Self::ProviderUnavailable(message)
            }
        }
    }
}

impl From<crate::config::ConfigError> for PilgrimError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::catalog::CatalogError> for PilgrimError {
    fn from(err: crate::catalog::CatalogError) -> Self {
        Self::CatalogError(err.to_string())
    }
}

impl From<crate::visits::VisitError> for PilgrimError {
    fn from(err: crate::visits::VisitError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
