//! Handlers for the administrator-only push delivery log.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tandem_core::notification::{DeliveryQuery, DeliveryStatus, NotificationDeliveryRecord};
use tandem_core::types::DbId;

use crate::error::AppResult;
use crate::middleware::principal::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /admin/deliveries`.
#[derive(Debug, Deserialize)]
pub struct DeliveryListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub recipient_id: Option<DbId>,
    pub status: Option<DeliveryStatus>,
}

/// GET /api/v1/admin/deliveries
pub async fn list_deliveries(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<DeliveryListParams>,
) -> AppResult<Json<DataResponse<Vec<NotificationDeliveryRecord>>>> {
    let query = DeliveryQuery {
        limit: params.limit.unwrap_or(0),
        offset: params.offset.unwrap_or(0),
        recipient_id: params.recipient_id,
        status: params.status,
    };
    let records = state.engine.deliveries.list_as(&admin, query).await?;
    Ok(Json(DataResponse { data: records }))
}

/// GET /api/v1/admin/deliveries/{id}
pub async fn get_delivery(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<NotificationDeliveryRecord>>> {
    let record = state.engine.deliveries.get_as(&admin, id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// POST /api/v1/admin/deliveries/{id}/delivered
///
/// Record the device receipt of a sent push. Only `sent` records can be
/// marked delivered.
pub async fn mark_delivered(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<NotificationDeliveryRecord>>> {
    let record = state.engine.deliveries.mark_delivered_as(&admin, id).await?;
    Ok(Json(DataResponse { data: record }))
}
