//! Tests for `AppError` to HTTP response mapping.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use serde_json::Value;
use tandem_api::error::AppError;
use tandem_core::admin_error::{AdminOperationError, OperationContext};
use tandem_core::classify::{ErrorKind, RawError};
use tandem_core::error::CoreError;
use tandem_core::service::RequestStatus;
use tandem_events::{EngineError, StoreError};

async fn parts(err: AppError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ---------------------------------------------------------------------------
// CoreError variants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_maps_to_404() {
    let (status, json) = parts(AppError::Core(CoreError::NotFound {
        entity: "sync status",
        id: "ride/abc".into(),
    }))
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["kind"], "not_found");
    assert_eq!(json["error"], "sync status with id ride/abc not found");
}

#[tokio::test]
async fn illegal_transition_maps_to_409() {
    let (status, json) = parts(AppError::Engine(EngineError::Core(
        CoreError::InvalidStatusTransition {
            from: RequestStatus::Completed,
            to: RequestStatus::Matched,
        },
    )))
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_TRANSITION");
    assert_eq!(json["kind"], "conflict");
}

#[tokio::test]
async fn forbidden_maps_to_403() {
    let (status, json) = parts(AppError::Core(CoreError::Forbidden("nope".into()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "permission_denied");
}

#[tokio::test]
async fn core_internal_error_is_sanitized() {
    let (status, json) = parts(AppError::Core(CoreError::Internal("secret detail".into()))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_timeout_maps_to_503_without_details() {
    let err = EngineError::Store(StoreError::Raw(RawError::message("timeout at 10.0.0.5")));
    let (status, json) = parts(AppError::Engine(err)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["kind"], "network_timeout");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.5"));
}

#[tokio::test]
async fn corrupt_row_maps_to_sanitized_500() {
    let err = EngineError::Store(StoreError::Decode(CoreError::Internal("bad ack column".into())));
    let (status, json) = parts(AppError::Engine(err)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["kind"], "unknown");
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Administrative failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admin_conflict_carries_operation_context() {
    let context = OperationContext::new("reassign", Some(1)).with_subject("ride/abc");
    let err = AdminOperationError::new(ErrorKind::Conflict, "Job is already assigned", context);
    let (status, json) = parts(AppError::Admin(err)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Job is already assigned");
    assert_eq!(json["kind"], "conflict");
    assert_eq!(json["context"]["action"], "reassign");
    assert_eq!(json["context"]["subject_ids"][0], "ride/abc");
}

// ---------------------------------------------------------------------------
// HTTP-specific errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_maps_to_400() {
    let (status, json) = parts(AppError::BadRequest("limit must be positive".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["kind"], "invalid_input");
}

#[tokio::test]
async fn internal_error_is_sanitized() {
    let (status, json) = parts(AppError::InternalError("stack trace".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");
}
