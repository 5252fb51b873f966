//! Handlers for the `/preferences` resource.
//!
//! A recipient may read and change only their own preferences;
//! administrators may manage anyone's.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tandem_core::notification::{NotificationCategory, NotificationPreference};
use tandem_core::types::DbId;

use crate::error::AppResult;
use crate::middleware::principal::ActorPrincipal;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `PUT /preferences/{recipient_id}/{category}`.
#[derive(Debug, Deserialize)]
pub struct UpdatePreference {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct CategoryState {
    pub recipient_id: DbId,
    pub category: NotificationCategory,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/preferences/{recipient_id}
///
/// One entry per category. Categories without a stored row report the
/// enabled default.
pub async fn get_preferences(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Path(recipient_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<NotificationPreference>>>> {
    let prefs = state
        .engine
        .preferences
        .get_preferences_as(&principal, recipient_id)
        .await?;
    Ok(Json(DataResponse { data: prefs }))
}

/// POST /api/v1/preferences/{recipient_id}/initialize
///
/// Create any missing category rows as enabled. Safe to call repeatedly.
pub async fn initialize(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Path(recipient_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<NotificationPreference>>>> {
    let prefs = state
        .engine
        .preferences
        .initialize_as(&principal, recipient_id)
        .await?;
    Ok(Json(DataResponse { data: prefs }))
}

/// GET /api/v1/preferences/{recipient_id}/{category}
pub async fn get_category(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Path((recipient_id, category)): Path<(DbId, String)>,
) -> AppResult<Json<DataResponse<CategoryState>>> {
    let category = NotificationCategory::from_name(&category)?;
    let enabled = state
        .engine
        .preferences
        .is_enabled_as(&principal, recipient_id, category)
        .await?;
    Ok(Json(DataResponse {
        data: CategoryState {
            recipient_id,
            category,
            enabled,
        },
    }))
}

/// PUT /api/v1/preferences/{recipient_id}/{category}
pub async fn update_category(
    ActorPrincipal(principal): ActorPrincipal,
    State(state): State<AppState>,
    Path((recipient_id, category)): Path<(DbId, String)>,
    Json(body): Json<UpdatePreference>,
) -> AppResult<Json<DataResponse<NotificationPreference>>> {
    let category = NotificationCategory::from_name(&category)?;
    let pref = state
        .engine
        .preferences
        .set_as(&principal, recipient_id, category, body.enabled)
        .await?;

    tracing::info!(
        recipient_id,
        category = %category,
        enabled = body.enabled,
        actor_id = principal.actor_id,
        "Notification preference updated"
    );

    Ok(Json(DataResponse { data: pref }))
}
