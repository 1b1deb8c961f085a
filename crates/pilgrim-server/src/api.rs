//! HTTP API routes and handlers.
//!
//! - `health` - Service health checks
//! - `tracking` - Session lifecycle
//! - `zones` - Zone registration and lookup
//! - `nearby` - Zones around the last accepted fix
//! - `fixes` - Position input
//! - `events` - Recent tracker events
//! - `visits` - Visit history
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;

use crate::state::SharedState;

pub mod error;
pub mod events;
pub mod fixes;
pub mod health;
pub mod nearby;
pub mod openapi;
pub mod tracking;
pub mod visits;
pub mod zones;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router.
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /tracking          - Session status and lifecycle
/// ├── /zones             - Zone registration
/// ├── /nearby            - Zones near the last fix
/// ├── /fixes             - Position and error input
/// ├── /events            - Recent tracker events
/// ├── /visits            - Visit history
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/tracking", tracking::router())
                .nest("/zones", zones::router())
                .nest("/nearby", nearby::router())
                .nest("/fixes", fixes::router())
                .nest("/events", events::router())
                .nest("/visits", visits::router()),
        )
        .with_state(state)
}
