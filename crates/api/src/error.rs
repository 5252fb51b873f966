use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tandem_core::admin_error::AdminOperationError;
use tandem_core::classify::{Classify, ErrorKind};
use tandem_core::error::CoreError;
use tandem_events::EngineError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, [`EngineError`] for failures from
/// the engine components and [`AdminOperationError`] for administrative
/// actions. Implements [`IntoResponse`] to produce consistent JSON error
/// responses carrying both an HTTP-level `code` and the classified `kind`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `tandem_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failure from an engine component (store, transport, domain rule).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A failed administrative action with its operation context.
    #[error(transparent)]
    Admin(#[from] AdminOperationError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl Classify for AppError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            AppError::Core(err) => err.error_kind(),
            AppError::Engine(err) => err.error_kind(),
            AppError::Admin(err) => err.error_kind(),
            AppError::BadRequest(_) => ErrorKind::InvalidInput,
            AppError::InternalError(_) => ErrorKind::Unknown,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.error_kind();
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) | AppError::Engine(EngineError::Core(core)) => {
                core_error_parts(core)
            }

            // --- Store and transport failures ---
            AppError::Engine(err) => classified_parts(kind, err),

            // --- Administrative actions ---
            AppError::Admin(err) => {
                let (status, code, message) = classified_parts(kind, err);
                let message = if status.is_server_error() {
                    message
                } else {
                    err.message.clone()
                };
                let body = json!({
                    "error": message,
                    "code": code,
                    "kind": kind,
                    "context": err.context,
                });
                return (status, axum::Json(body)).into_response();
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
            "kind": kind,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn core_error_parts(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::InvalidStatusTransition { .. } => (
            StatusCode::CONFLICT,
            "INVALID_TRANSITION",
            core.to_string(),
        ),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Map a classified failure to an HTTP status, error code, and message.
///
/// - Transient network conditions map to 503 so callers may retry.
/// - Unclassified failures map to 500 with a sanitized message.
fn classified_parts(
    kind: ErrorKind,
    err: &dyn std::error::Error,
) -> (StatusCode, &'static str, String) {
    match kind {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
        ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
        ErrorKind::NetworkTimeout | ErrorKind::NetworkUnavailable => {
            tracing::warn!(error = %err, kind = %kind, "Upstream unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "The service is temporarily unavailable, please retry".to_string(),
            )
        }
        ErrorKind::Unknown => {
            tracing::error!(error = %err, "Unclassified error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
