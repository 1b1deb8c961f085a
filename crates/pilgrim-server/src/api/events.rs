//! Event journal API endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::journal::{JournalEntry, JOURNAL_CAPACITY};
use crate::state::SharedState;

/// Events returned when no limit is given.
const DEFAULT_LIMIT: usize = 50;

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_events))
}

/// Query parameters for the events endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Maximum number of events to return (at most 200).
    #[param(example = 50, maximum = 200)]
    pub limit: Option<usize>,
}

/// Recent tracker events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventsResponse {
    /// Events, oldest first.
    pub events: Vec<JournalEntry>,

    /// Events published since startup, including ones no longer held.
    #[schema(example = 1234)]
    pub total_recorded: u64,
}

/// List recent tracker events.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    operation_id = "getEvents",
    summary = "List recent tracker events",
    description = "Returns the most recent enter, exit, position and error events \
        published by the tracker. The server keeps the last 200.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Recent events", body = EventsResponse)
    )
)]
pub async fn get_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let state_guard = state.read().await;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(JOURNAL_CAPACITY);
    Json(EventsResponse {
        events: state_guard.journal.recent(limit),
        total_recorded: state_guard.journal.total(),
    })
}
