//! Request handlers for the engine's HTTP surface.
//!
//! Each submodule provides async handler functions for one resource.
//! Handlers delegate to the corresponding [`tandem_events::Engine`]
//! component, passing the caller's principal so access is gated by the
//! engine itself, and map errors via [`AppError`](crate::error::AppError).

pub mod deliveries;
pub mod events;
pub mod preferences;
pub mod reassign;
pub mod sync;

use tandem_core::service::{RequestRef, ServiceType};
use uuid::Uuid;

use crate::error::AppResult;

/// Build a [`RequestRef`] from the `{service_type}/{request_id}` path segments.
pub(crate) fn request_ref(service_type: &str, request_id: Uuid) -> AppResult<RequestRef> {
    Ok(RequestRef::new(ServiceType::from_name(service_type)?, request_id))
}
