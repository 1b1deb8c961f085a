//! Visit history API endpoints.
//!
//! A visit is recorded each time a zone is entered. The history is capped;
//! the oldest visits are dropped first.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use pilgrim_core::VisitRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the visits router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_visits).delete(clear_visits))
}

/// Visit history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisitsResponse {
    /// Visits, oldest first.
    pub visits: Vec<VisitRecord>,

    /// Number of visits held.
    #[schema(example = 3)]
    pub count: usize,

    /// Maximum number of visits kept.
    #[schema(example = 100)]
    pub max_entries: usize,
}

/// Get visit history.
#[utoipa::path(
    get,
    path = "/api/visits",
    tag = "visits",
    operation_id = "getVisits",
    summary = "Get visit history",
    responses(
        (status = 200, description = "Visit history", body = VisitsResponse)
    )
)]
pub async fn get_visits(State(state): State<SharedState>) -> Json<VisitsResponse> {
    let state_guard = state.read().await;
    let visits = state_guard.recorder.history();
    Json(VisitsResponse {
        count: visits.len(),
        visits,
        max_entries: state_guard.config.visits.max_entries,
    })
}

/// Clear visit history.
#[utoipa::path(
    delete,
    path = "/api/visits",
    tag = "visits",
    operation_id = "clearVisits",
    summary = "Clear visit history",
    description = "Erases every recorded visit, in memory and on disk.",
    responses(
        (status = 204, description = "History cleared"),
        (status = 500, description = "History could not be saved", body = ErrorResponse)
    )
)]
pub async fn clear_visits(State(state): State<SharedState>) -> ApiResult<StatusCode> {
    let state_guard = state.write().await;
    state_guard.recorder.clear()?;
    Ok(StatusCode::NO_CONTENT)
}
