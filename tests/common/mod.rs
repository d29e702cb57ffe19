#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode, Uri},
    Json, Router,
};
use harp_environment::auth::TokenVerifier;
use harp_environment::organization::OrganizationService;
use harp_environment::publisher::MemoryPublisher;
use harp_environment::rest::{create_router, AppState};
use harp_environment::storage::Storage;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";
pub const TOPIC: &str = "environment-update";

/// Stand-in for a sibling service: answers every request with `status`
/// and remembers `(path, body)` of each call.
pub struct FakeService {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeService {
    pub async fn spawn(status: StatusCode) -> Self {
        Self::spawn_delayed(status, Duration::ZERO).await
    }

    /// Like [`FakeService::spawn`], but waits `delay` before answering.
    pub async fn spawn_delayed(status: StatusCode, delay: Duration) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let app = Router::new().fallback(move |uri: Uri, Json(body): Json<Value>| async move {
            recorded.lock().unwrap().push((uri.path().to_string(), body));
            tokio::time::sleep(delay).await;
            (status, Json(json!({ "msg": "fake response" })))
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        Self { addr, calls }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

/// Address nothing listens on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/scenarios")
}

pub struct TestApp {
    pub router: Router,
    pub publisher: Arc<MemoryPublisher>,
    pub storage: Storage,
}

impl TestApp {
    pub fn new(scenarios_url: &str, users_url: &str) -> Self {
        Self::with_timeout(scenarios_url, users_url, Duration::from_secs(5))
    }

    pub fn with_timeout(scenarios_url: &str, users_url: &str, timeout: Duration) -> Self {
        let storage = Storage::temporary().expect("temporary storage");
        let publisher = Arc::new(MemoryPublisher::default());
        let organizations = OrganizationService::new(
            storage.clone(),
            scenarios_url,
            users_url,
            timeout,
        )
        .unwrap();
        let state = AppState::new(
            storage.clone(),
            publisher.clone(),
            organizations,
            TokenVerifier::new(SECRET),
            TOPIC,
        );
        Self { router: create_router(state), publisher, storage }
    }

    /// App whose sibling services are never reached.
    pub fn offline() -> Self {
        Self::new("http://127.0.0.1:9/scenarios", "http://127.0.0.1:9/users")
    }

    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>, auth: bool) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if auth {
            let token = TokenVerifier::new(SECRET).issue("integration", 300).unwrap();
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
