//! Handlers for transition intake, acknowledgments and sync rows.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use tandem_core::access::Principal;
use tandem_core::error::CoreError;
use tandem_core::roles::Role;
use tandem_core::sync::{RoleSyncStatus, TransitionRequest};
use tandem_core::types::DbId;
use tandem_events::{EngineError, TransitionOutcome};
use uuid::Uuid;

use super::request_ref;
use crate::error::{AppError, AppResult};
use crate::middleware::principal::ActorPrincipal;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AckResponse {
    /// `false` when the role had already acknowledged the current state.
    pub acknowledged: bool,
}

/// POST /api/v1/requests/transitions
///
/// Observe a status transition (or a location update) and notify the
/// participants. Non-administrators may only report transitions of requests
/// they take part in, and are recorded as the acting party.
pub async fn report_transition(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Json(mut transition): Json<TransitionRequest>,
) -> AppResult<Json<DataResponse<TransitionOutcome>>> {
    ensure_may_report(&state, &principal, &mut transition).await?;

    tracing::info!(
        request = %transition.request,
        new_status = %transition.new_status,
        actor_id = principal.actor_id,
        "Transition reported"
    );

    let outcome = state.engine.process_transition(transition).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/requests/{service_type}/{request_id}/ack
///
/// Acknowledge the current state of a request as the caller's role.
pub async fn acknowledge(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Path((service_type, request_id)): Path<(String, Uuid)>,
) -> AppResult<Json<DataResponse<AckResponse>>> {
    let request = request_ref(&service_type, request_id)?;
    let acknowledged = state.engine.tracker.acknowledge_as(&principal, &request).await?;
    Ok(Json(DataResponse {
        data: AckResponse { acknowledged },
    }))
}

/// GET /api/v1/requests/{service_type}/{request_id}/sync
pub async fn get_sync_status(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Path((service_type, request_id)): Path<(String, Uuid)>,
) -> AppResult<Json<DataResponse<RoleSyncStatus>>> {
    let request = request_ref(&service_type, request_id)?;
    let row = state.engine.tracker.get_for(&principal, &request).await?;
    Ok(Json(DataResponse { data: row }))
}

/// GET /api/v1/sync
///
/// Sync rows visible to the caller, most recently updated first.
pub async fn list_sync_statuses(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<RoleSyncStatus>>>> {
    let rows = state
        .engine
        .tracker
        .list_for(&principal, params.limit(), params.offset())
        .await?;
    Ok(Json(DataResponse { data: rows }))
}

/// Administrators may report any transition. Anyone else must be a
/// participant of the existing row, or name themselves as a participant of
/// a request not seen yet. Non-administrators may fill in a missing
/// participant but never replace one.
async fn ensure_may_report(
    state: &AppState,
    principal: &Principal,
    transition: &mut TransitionRequest,
) -> AppResult<()> {
    if principal.is_privileged() {
        return Ok(());
    }

    match state.engine.tracker.get_for(principal, &transition.request).await {
        Ok(row) => {
            if reassigns_participant(row.customer_id, transition.customer_id)
                || reassigns_participant(row.provider_id, transition.provider_id)
            {
                return Err(AppError::Core(CoreError::Forbidden(
                    "Only an administrator may change the participants of a request".into(),
                )));
            }
        }
        Err(EngineError::Core(CoreError::NotFound { .. })) => {
            let named = match principal.role {
                Role::Customer => transition.customer_id == Some(principal.actor_id),
                Role::Provider => transition.provider_id == Some(principal.actor_id),
                Role::Admin | Role::System => false,
            };
            if !named {
                return Err(AppError::Core(CoreError::Forbidden(
                    "Only a participant may report transitions of this request".into(),
                )));
            }
        }
        Err(e) => return Err(e.into()),
    }

    transition.actor_id = Some(principal.actor_id);
    Ok(())
}

/// A reported participant that would replace one already on the row.
fn reassigns_participant(current: Option<DbId>, reported: Option<DbId>) -> bool {
    matches!((current, reported), (Some(current), Some(reported)) if current != reported)
}
