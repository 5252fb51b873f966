//! Route definitions for the `/preferences` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::preferences;
use crate::state::AppState;

/// Routes mounted at `/preferences`.
///
/// ```text
/// GET    /{recipient_id}                 -> get_preferences
/// POST   /{recipient_id}/initialize      -> initialize
/// GET    /{recipient_id}/{category}      -> get_category
/// PUT    /{recipient_id}/{category}      -> update_category
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{recipient_id}", get(preferences::get_preferences))
        .route("/{recipient_id}/initialize", post(preferences::initialize))
        .route(
            "/{recipient_id}/{category}",
            get(preferences::get_category).put(preferences::update_category),
        )
}
