//! Shared helpers for API integration tests.
//!
//! The app is built over the in-memory store, so no database is required.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tandem_api::config::ServerConfig;
use tandem_api::middleware::principal::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use tandem_api::router::build_app_router;
use tandem_api::state::AppState;
use tandem_core::types::DbId;
use tandem_events::{Engine, LogTransport, MemoryStore, RetryPolicy};

pub const CUSTOMER: Actor = Actor(10, "customer");
pub const OTHER_CUSTOMER: Actor = Actor(11, "customer");
pub const PROVIDER: Actor = Actor(20, "provider");
pub const ADMIN: Actor = Actor(1, "admin");

/// An `(x-actor-id, x-actor-role)` header pair.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub DbId, pub &'static str);

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

pub struct TestApp {
    pub store: MemoryStore,
    pub engine: Arc<Engine>,
    pub router: Router,
}

/// Build the full application router with all middleware layers over a
/// fresh in-memory store.
pub fn build_test_app() -> TestApp {
    let store = MemoryStore::new();
    let engine = Arc::new(Engine::new(
        Arc::new(store.clone()),
        Arc::new(LogTransport),
        RetryPolicy::no_retry(),
    ));
    let config = test_config();
    let state = AppState {
        engine: engine.clone(),
        config: Arc::new(config.clone()),
        pool: None,
    };
    TestApp {
        store,
        engine,
        router: build_app_router(state, &config),
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        actor: Option<Actor>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(Actor(id, role)) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, id.to_string())
                .header(ACTOR_ROLE_HEADER, role);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, actor: Actor) -> Response<Body> {
        self.send(Method::GET, uri, Some(actor), None).await
    }

    pub async fn post(&self, uri: &str, actor: Actor) -> Response<Body> {
        self.send(Method::POST, uri, Some(actor), None).await
    }

    pub async fn post_json(&self, uri: &str, actor: Actor, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(actor), Some(body)).await
    }

    pub async fn put_json(&self, uri: &str, actor: Actor, body: Value) -> Response<Body> {
        self.send(Method::PUT, uri, Some(actor), Some(body)).await
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
