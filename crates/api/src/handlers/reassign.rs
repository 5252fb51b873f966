//! Handler for administrative job reassignment.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tandem_core::types::DbId;
use tandem_events::{ReassignOutcome, ReassignRequest};
use uuid::Uuid;

use super::request_ref;
use crate::error::AppResult;
use crate::middleware::principal::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /admin/requests/{service_type}/{request_id}/reassign`.
#[derive(Debug, Deserialize)]
pub struct ReassignBody {
    pub new_assignee_id: DbId,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/v1/admin/requests/{service_type}/{request_id}/reassign
///
/// Move a request to another provider. Failures carry the full operation
/// context in the error body.
pub async fn reassign(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path((service_type, request_id)): Path<(String, Uuid)>,
    Json(body): Json<ReassignBody>,
) -> AppResult<Json<DataResponse<ReassignOutcome>>> {
    let request = request_ref(&service_type, request_id)?;
    let outcome = state
        .engine
        .reassignment
        .reassign(
            &admin,
            ReassignRequest {
                request,
                new_assignee_id: body.new_assignee_id,
                reason: body.reason,
                notes: body.notes,
            },
        )
        .await?;
    Ok(Json(DataResponse { data: outcome }))
}
