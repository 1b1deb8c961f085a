//! API error types and response handling.
//!
//! Every handler returns [`ApiResult`]; errors become a JSON
//! [`ErrorResponse`] with the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pilgrim_core::PilgrimError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - The resource already exists.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The location provider refused a watch.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl ApiError {
    /// 404 for an unknown zone id.
    #[must_use]
    pub fn zone_not_found(id: &str) -> Self {
        Self::from(PilgrimError::ZoneNotFound(id.to_string()))
    }

    /// 400 with the given code and message.
    #[must_use]
    pub fn bad_request(error_code: &str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "DUPLICATE_ZONE",
    "message": "Zone 'rumtek' is already registered. Remove it first or choose another id.",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "DUPLICATE_ZONE")]
    pub error: String,

    /// Human-readable error message.
    pub message: String,

    /// Optional additional details.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest {
                error_code,
                message,
            }
            | Self::NotFound {
                error_code,
                message,
            }
            | Self::Conflict {
                error_code,
                message,
            }
            | Self::ServiceUnavailable {
                error_code,
                message,
            } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(serde_json::Value::String),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PilgrimError> for ApiError {
    fn from(err: PilgrimError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();
        match err.http_status_code() {
            400 | 422 => Self::BadRequest {
                error_code,
                message,
            },
            404 => Self::NotFound {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<pilgrim_core::TrackerError> for ApiError {
    fn from(err: pilgrim_core::TrackerError) -> Self {
        Self::from(PilgrimError::from(err))
    }
}

impl From<pilgrim_core::VisitError> for ApiError {
    fn from(err: pilgrim_core::VisitError) -> Self {
        Self::from(PilgrimError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilgrim_core::{ProviderError, TrackerError};

    #[test]
    fn test_duplicate_zone_is_conflict() {
        let err = ApiError::from(TrackerError::DuplicateZone { id: "z1".into() });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("Conflict"));
    }

    #[test]
    fn test_invalid_zone_is_bad_request() {
        let err = ApiError::from(TrackerError::InvalidZone {
            id: "z1".into(),
            reason: "radius must be positive".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_provider_error_is_service_unavailable() {
        let err = ApiError::from(TrackerError::Provider(ProviderError::Unavailable {
            message: "no GPS".into(),
        }));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_zone_not_found() {
        let err = ApiError::zone_not_found("nowhere");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_persistence_error_is_internal() {
        let err = ApiError::from(PilgrimError::PersistenceError("disk full".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "INVALID_FIX".to_string(),
            message: "Invalid position fix: latitude missing".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\":\"INVALID_FIX\""));
    }
}
