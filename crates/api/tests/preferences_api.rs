//! HTTP-level tests for notification preferences.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{body_json, build_test_app, ADMIN, CUSTOMER, PROVIDER};

#[tokio::test]
async fn new_recipient_sees_every_category_enabled() {
    let t = build_test_app();
    let response = t.get("/api/v1/preferences/10", CUSTOMER).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let prefs = json["data"].as_array().unwrap();
    assert_eq!(prefs.len(), 5);
    assert!(prefs.iter().all(|p| p["enabled"] == true));
    assert_eq!(prefs[0]["category"], "new_job");
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let t = build_test_app();
    for _ in 0..2 {
        let response = t.post("/api/v1/preferences/10/initialize", CUSTOMER).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 5);
    }
}

#[tokio::test]
async fn disabling_a_category_is_visible_on_read() {
    let t = build_test_app();
    let response = t
        .put_json(
            "/api/v1/preferences/10/promotions",
            CUSTOMER,
            json!({"enabled": false}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["enabled"], false);

    let promotions = body_json(t.get("/api/v1/preferences/10/promotions", CUSTOMER).await).await;
    assert_eq!(promotions["data"]["enabled"], false);

    let updates = body_json(t.get("/api/v1/preferences/10/job_update", CUSTOMER).await).await;
    assert_eq!(updates["data"]["enabled"], true);
}

#[tokio::test]
async fn recipients_cannot_touch_each_others_preferences() {
    let t = build_test_app();
    let read = t.get("/api/v1/preferences/10", PROVIDER).await;
    assert_eq!(read.status(), StatusCode::FORBIDDEN);

    let write = t
        .put_json(
            "/api/v1/preferences/10/earnings",
            PROVIDER,
            json!({"enabled": false}),
        )
        .await;
    assert_eq!(write.status(), StatusCode::FORBIDDEN);

    let admin = t.get("/api/v1/preferences/10", ADMIN).await;
    assert_eq!(admin.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_category_returns_400() {
    let t = build_test_app();
    let response = t.get("/api/v1/preferences/10/marketing", CUSTOMER).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
