//! HTTP-level tests for administrator endpoints: reassignment, the delivery
//! log and event publishing.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use tandem_core::service::{RequestRef, ServiceType};
use uuid::Uuid;

use common::{body_json, build_test_app, TestApp, ADMIN, CUSTOMER, PROVIDER};

async fn accepted_job(t: &TestApp) -> Value {
    let response = t
        .post_json(
            "/api/v1/requests/transitions",
            ADMIN,
            json!({
                "request": {"service_type": "ride", "request_id": Uuid::new_v4()},
                "new_status": "matched",
                "customer_id": 10,
                "provider_id": 20,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Reassignment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reassign_requires_admin() {
    let t = build_test_app();
    let response = t
        .post_json(
            &format!("/api/v1/admin/requests/ride/{}/reassign", Uuid::new_v4()),
            CUSTOMER,
            json!({"new_assignee_id": 31}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reassign_of_unknown_job_returns_404_with_context() {
    let t = build_test_app();
    let response = t
        .post_json(
            &format!("/api/v1/admin/requests/delivery/{}/reassign", Uuid::new_v4()),
            ADMIN,
            json!({"new_assignee_id": 31, "reason": "provider unresponsive"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["kind"], "not_found");
    assert_eq!(json["context"]["action"], "reassign");
    assert_eq!(json["context"]["actor_id"], 1);
}

#[tokio::test]
async fn reassign_moves_the_job_once() {
    let t = build_test_app();
    let request = RequestRef::new(ServiceType::Delivery, Uuid::new_v4());
    t.store.seed_assignment(request, Some(20)).await;
    let uri = format!("/api/v1/admin/requests/delivery/{}/reassign", request.request_id);

    let response = t.post_json(&uri, ADMIN, json!({"new_assignee_id": 31})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["success"], true);
    assert_eq!(json["data"]["assignee_id"], 31);

    let again = t.post_json(&uri, ADMIN, json!({"new_assignee_id": 31})).await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let json = body_json(again).await;
    assert!(json["error"].as_str().unwrap().contains("already assigned"));
}

// ---------------------------------------------------------------------------
// Delivery log
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivery_log_is_admin_only() {
    let t = build_test_app();
    accepted_job(&t).await;

    for actor in [CUSTOMER, PROVIDER] {
        let response = t.get("/api/v1/admin/deliveries", actor).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let json = body_json(t.get("/api/v1/admin/deliveries?status=sent&recipient_id=10", ADMIN).await).await;
    let records = json["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["notification_type"], "job_accepted");
}

#[tokio::test]
async fn device_receipt_marks_a_sent_record_delivered_once() {
    let t = build_test_app();
    let job = accepted_job(&t).await;
    let id = job["deliveries"][0]["id"].as_i64().unwrap();

    let response = t
        .post(&format!("/api/v1/admin/deliveries/{id}/delivered"), ADMIN)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "delivered");
    assert!(json["data"]["latency_ms"].is_number());

    let again = t
        .post(&format!("/api/v1/admin/deliveries/{id}/delivered"), ADMIN)
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    let record = body_json(t.get(&format!("/api/v1/admin/deliveries/{id}"), ADMIN).await).await;
    assert_eq!(record["data"]["status"], "delivered");
}

#[tokio::test]
async fn unknown_delivery_returns_404() {
    let t = build_test_app();
    let response = t.get("/api/v1/admin/deliveries/999", ADMIN).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_promotion_reaches_opted_in_customers() {
    let t = build_test_app();
    t.put_json(
        "/api/v1/preferences/11/promotions",
        ADMIN,
        json!({"enabled": false}),
    )
    .await;

    let response = t
        .post_json(
            "/api/v1/admin/events",
            ADMIN,
            json!({
                "event": {
                    "event_type": "promotion",
                    "event_category": "system",
                    "source_role": "system",
                    "event_data": {"title": "50% off", "body": "Today only"},
                    "metadata": {},
                },
                "candidates": [
                    {"actor_id": 10, "role": "customer"},
                    {"actor_id": 11, "role": "customer"},
                ],
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["event"]["event_type"], "promotion");
    let deliveries = json["data"]["deliveries"].as_array().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0]["recipient_id"], 10);
    assert_eq!(deliveries[0]["title"], "50% off");
}

#[tokio::test]
async fn publishing_requires_admin() {
    let t = build_test_app();
    let response = t
        .post_json(
            "/api/v1/admin/events",
            PROVIDER,
            json!({"event": {}, "candidates": []}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
