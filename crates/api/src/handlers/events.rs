//! Handlers for the cross-role event feed.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tandem_core::cross_role::{CrossRoleEvent, EventCategory, EventQuery, NewCrossRoleEvent};
use tandem_core::service::ServiceType;
use tandem_core::types::Timestamp;
use tandem_events::{PublishOutcome, Recipient};

use crate::error::AppResult;
use crate::middleware::principal::{ActorPrincipal, RequireAdmin};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventListParams {
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub service_type: Option<ServiceType>,
    pub category: Option<EventCategory>,
    /// Cursor: only events created strictly before this instant.
    pub before: Option<Timestamp>,
}

/// Request body for `POST /admin/events`.
#[derive(Debug, Deserialize)]
pub struct PublishEvent {
    pub event: NewCrossRoleEvent,
    #[serde(default)]
    pub candidates: Vec<Recipient>,
}

/// GET /api/v1/events
///
/// Newest-first page of events the caller may read.
pub async fn list_events(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> AppResult<Json<DataResponse<Vec<CrossRoleEvent>>>> {
    let query = EventQuery {
        limit: params.limit.unwrap_or(0),
        offset: params.offset.unwrap_or(0),
        service_type: params.service_type,
        category: params.category,
        before: params.before,
        involving_actor: None,
    };
    let events = state.engine.events.recent_for(&principal, query).await?;
    Ok(Json(DataResponse { data: events }))
}

/// POST /api/v1/admin/events
///
/// Append an event raised outside the status graph (announcements,
/// promotions, SOS) and dispatch it to the given candidates.
pub async fn publish_event(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<PublishEvent>,
) -> AppResult<Json<DataResponse<PublishOutcome>>> {
    tracing::info!(
        event_type = %body.event.event_type,
        candidates = body.candidates.len(),
        actor_id = admin.actor_id,
        "Publishing event"
    );
    let outcome = state.engine.publish(body.event, &body.candidates).await?;
    Ok(Json(DataResponse { data: outcome }))
}
