//! Route definitions for administrator-only endpoints.
//!
//! Every handler here takes [`RequireAdmin`](crate::middleware::principal::RequireAdmin).

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{deliveries, events, reassign};
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// POST   /requests/{service_type}/{request_id}/reassign  -> reassign
/// POST   /events                                         -> publish_event
/// GET    /deliveries                                     -> list_deliveries
/// GET    /deliveries/{id}                                -> get_delivery
/// POST   /deliveries/{id}/delivered                      -> mark_delivered
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/requests/{service_type}/{request_id}/reassign",
            post(reassign::reassign),
        )
        .route("/events", post(events::publish_event))
        .route("/deliveries", get(deliveries::list_deliveries))
        .route("/deliveries/{id}", get(deliveries::get_delivery))
        .route("/deliveries/{id}/delivered", post(deliveries::mark_delivered))
}
