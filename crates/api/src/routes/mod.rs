pub mod admin;
pub mod health;
pub mod preferences;
pub mod requests;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Every route requires the gateway principal headers (`x-actor-id`,
/// `x-actor-role`).
///
/// Route hierarchy:
///
/// ```text
/// /requests/transitions                                report transition (POST)
/// /requests/{service_type}/{request_id}/ack            acknowledge current state (POST)
/// /requests/{service_type}/{request_id}/sync           sync row (GET)
///
/// /sync                                                visible sync rows (GET)
///
/// /preferences/{recipient_id}                          all categories (GET)
/// /preferences/{recipient_id}/initialize               create missing rows (POST)
/// /preferences/{recipient_id}/{category}               get, update (GET, PUT)
///
/// /events                                              event feed (GET)
///
/// /admin/requests/{service_type}/{request_id}/reassign reassign provider (POST)
/// /admin/events                                        publish event (POST)
/// /admin/deliveries                                    delivery log (GET)
/// /admin/deliveries/{id}                               delivery record (GET)
/// /admin/deliveries/{id}/delivered                     record device receipt (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/requests", requests::router())
        .route("/sync", get(handlers::sync::list_sync_statuses))
        .nest("/preferences", preferences::router())
        .route("/events", get(handlers::events::list_events))
        .nest("/admin", admin::router())
}
