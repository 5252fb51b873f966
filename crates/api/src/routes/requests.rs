//! Route definitions for the `/requests` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::sync;
use crate::state::AppState;

/// Routes mounted at `/requests`.
///
/// ```text
/// POST   /transitions                              -> report_transition
/// POST   /{service_type}/{request_id}/ack          -> acknowledge
/// GET    /{service_type}/{request_id}/sync         -> get_sync_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/transitions", post(sync::report_transition))
        .route("/{service_type}/{request_id}/ack", post(sync::acknowledge))
        .route("/{service_type}/{request_id}/sync", get(sync::get_sync_status))
}
