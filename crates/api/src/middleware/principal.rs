//! Caller identity extractors.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! actor in the `x-actor-id` and `x-actor-role` headers, which are trusted
//! as-is here.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tandem_core::access::Principal;
use tandem_core::error::CoreError;
use tandem_core::roles::Role;
use tandem_core::types::DbId;

use crate::error::AppError;
use crate::state::AppState;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The calling actor as a [`Principal`].
///
/// ```ignore
/// async fn my_handler(ActorPrincipal(principal): ActorPrincipal) -> AppResult<Json<()>> {
///     tracing::info!(actor_id = principal.actor_id, role = %principal.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ActorPrincipal(pub Principal);

impl FromRequestParts<AppState> for ActorPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor_id: DbId = header(parts, ACTOR_ID_HEADER)?
            .parse()
            .map_err(|_| unauthorized("x-actor-id must be an integer id"))?;

        let role = Role::from_name(header(parts, ACTOR_ROLE_HEADER)?)
            .map_err(|_| unauthorized("x-actor-role must be one of: customer, provider, admin"))?;

        // Internal services never call through the gateway.
        if role == Role::System {
            return Err(unauthorized(
                "x-actor-role must be one of: customer, provider, admin",
            ));
        }

        Ok(ActorPrincipal(Principal::new(actor_id, role)))
    }
}

/// Requires the `admin` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(admin): RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin(pub Principal);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ActorPrincipal(principal) = ActorPrincipal::from_request_parts(parts, state).await?;
        if principal.role != Role::Admin {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(principal))
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or_else(|| unauthorized(&format!("Missing {name} header")))
}

fn unauthorized(message: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(message.to_string()))
}
