//! REST API for environments using Axum.
//!
//! All routes live under `/api/v1/environments`:
//! - CRUD on single environments, by id (and lookup by name)
//! - `all` / `client/all` listings
//! - `create-organization` provisioning workflow (unauthenticated)
//!
//! Mutating routes and `client/all` are wrapped in the bearer token check;
//! the middleware is attached per route entry with `route_layer`.

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{bearer_token, TokenVerifier};
use crate::error::{EnvironmentError, Result};
use crate::models::{
    ClientEnvironment, Environment, EnvironmentInput, EnvironmentMessage, OrganizationRequest,
    StatusMessage, UserVisibility,
};
use crate::organization::OrganizationService;
use crate::publisher::{EnvironmentEvent, EventPublisher};
use crate::schema;
use crate::storage::Storage;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
#[derive(Clone)]
pub struct AppState {
    storage: Storage,
    publisher: Arc<dyn EventPublisher>,
    organizations: OrganizationService,
    tokens: TokenVerifier,
    topic: String,
}

impl AppState {
    pub fn new(
        storage: Storage,
        publisher: Arc<dyn EventPublisher>,
        organizations: OrganizationService,
        tokens: TokenVerifier,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            publisher,
            organizations,
            tokens,
            topic: topic.into(),
        }
    }

    async fn publish(&self, event: EnvironmentEvent) -> Result<()> {
        self.publisher.publish(&self.topic, &event).await
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_environment,
        get_environment,
        update_environment,
        delete_environment,
        list_all_handler,
        list_for_client_handler,
        create_organization_handler,
        delete_organization_handler,
        health_handler,
    ),
    components(schemas(
        Environment,
        EnvironmentInput,
        EnvironmentMessage,
        UserVisibility,
        ClientEnvironment,
        OrganizationRequest,
        StatusMessage,
    )),
    modifiers(&BearerAuth),
    tags((name = "environments", description = "Harp environments endpoints"))
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| EnvironmentError::Unauthorized("Authorization token is missing".into()))?;

    let claims = state
        .tokens
        .validate(token)
        .map_err(|e| EnvironmentError::Unauthorized(format!("Invalid token: {e}")))?;

    tracing::debug!(subject = %claims.sub, "token accepted");
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

async fn trace_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();
    let response = next.run(req).await;
    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

/// Create the Axum router with every environment endpoint
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    Router::new()
        .route(
            "/api/v1/environments",
            put(create_environment).route_layer(auth.clone()),
        )
        .route(
            "/api/v1/environments/create-organization",
            put(create_organization_handler).delete(delete_organization_handler),
        )
        .route("/api/v1/environments/all", get(list_all_handler))
        .route(
            "/api/v1/environments/client/all",
            get(list_for_client_handler).route_layer(auth.clone()),
        )
        .route(
            "/api/v1/environments/:key",
            get(get_environment).merge(
                post(update_environment)
                    .delete(delete_environment)
                    .route_layer(auth),
            ),
        )
        .route("/api/v1/health", get(health_handler))
        .layer(middleware::from_fn(trace_middleware))
        .with_state(state)
        .merge(SwaggerUi::new("/api/v1/docs").url("/api/v1/openapi.json", ApiDoc::openapi()))
}

/// Numeric path segments address environments by id; anything else is a name.
fn numeric_id(key: &str) -> Option<i64> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

fn require_id(key: &str) -> Result<i64> {
    numeric_id(key)
        .filter(|id| *id > 0)
        .ok_or_else(|| EnvironmentError::not_found("environment_id should be specified"))
}

#[utoipa::path(
    put,
    path = "/api/v1/environments",
    tag = "environments",
    request_body = EnvironmentInput,
    responses(
        (status = 200, description = "Environment created", body = Environment),
        (status = 400, description = "Invalid payload or duplicate name", body = StatusMessage),
        (status = 401, description = "Missing or invalid token", body = StatusMessage),
        (status = 500, description = "Internal error", body = StatusMessage)
    ),
    security(("bearer" = []))
)]
async fn create_environment(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Environment>> {
    let input = schema::parse_environment(&body)?;
    let env = state.storage.add(&input)?;
    state.publish(EnvironmentEvent::Add(env.clone())).await?;
    Ok(Json(env))
}

#[utoipa::path(
    get,
    path = "/api/v1/environments/{key}",
    tag = "environments",
    params(("key" = String, Path, description = "Environment id, or name when not numeric")),
    responses(
        (status = 200, description = "Environment found", body = EnvironmentMessage),
        (status = 404, description = "No such environment", body = StatusMessage)
    )
)]
async fn get_environment(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EnvironmentMessage>> {
    let found = match numeric_id(&key) {
        Some(id) => state.storage.get_by_id(id)?,
        None => state.storage.get_by_name(&key)?,
    };
    found
        .map(|env| Json(EnvironmentMessage { msg: env }))
        .ok_or_else(|| EnvironmentError::not_found(format!("Environment {key} is not found")))
}

#[utoipa::path(
    post,
    path = "/api/v1/environments/{key}",
    tag = "environments",
    params(("key" = i64, Path, description = "Environment id")),
    request_body = EnvironmentInput,
    responses(
        (status = 200, description = "Environment updated", body = Environment),
        (status = 400, description = "Invalid payload or duplicate name", body = StatusMessage),
        (status = 401, description = "Missing or invalid token", body = StatusMessage),
        (status = 404, description = "No such environment", body = StatusMessage)
    ),
    security(("bearer" = []))
)]
async fn update_environment(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<Environment>> {
    let id = require_id(&key)?;
    if state.storage.get_by_id(id)?.is_none() {
        return Err(EnvironmentError::not_found(
            "Environment with specified id is not exist",
        ));
    }
    let input = schema::parse_environment(&body)?;
    let env = state.storage.update(id, &input)?;
    state.publish(EnvironmentEvent::Update(env.clone())).await?;
    Ok(Json(env))
}

#[utoipa::path(
    delete,
    path = "/api/v1/environments/{key}",
    tag = "environments",
    params(("key" = i64, Path, description = "Environment id")),
    responses(
        (status = 200, description = "Environment deleted", body = StatusMessage),
        (status = 401, description = "Missing or invalid token", body = StatusMessage),
        (status = 404, description = "No such environment", body = StatusMessage)
    ),
    security(("bearer" = []))
)]
async fn delete_environment(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<StatusMessage>> {
    let id = require_id(&key)?;
    state.storage.delete(id)?;
    state
        .publish(EnvironmentEvent::Delete { environment_id: id })
        .await?;
    Ok(Json(StatusMessage::new(format!(
        "Environment with id: {id} successfully deleted"
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/environments/all",
    tag = "environments",
    responses((status = 200, description = "Environment names keyed by id", body = HashMap<String, String>))
)]
async fn list_all_handler(State(state): State<Arc<AppState>>) -> Result<Json<BTreeMap<i64, String>>> {
    Ok(Json(state.storage.list_all()?))
}

#[utoipa::path(
    get,
    path = "/api/v1/environments/client/all",
    tag = "environments",
    responses(
        (status = 200, description = "Environments for client", body = [ClientEnvironment]),
        (status = 401, description = "Missing or invalid token", body = StatusMessage)
    ),
    security(("bearer" = []))
)]
async fn list_for_client_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ClientEnvironment>>> {
    Ok(Json(state.storage.list_for_client()?))
}

#[utoipa::path(
    put,
    path = "/api/v1/environments/create-organization",
    tag = "environments",
    request_body = OrganizationRequest,
    responses(
        (status = 200, description = "Free organization provisioned", body = StatusMessage),
        (status = 400, description = "Already registered, or a sibling service refused", body = StatusMessage),
        (status = 500, description = "Internal error", body = StatusMessage)
    )
)]
async fn create_organization_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<StatusMessage>> {
    let req = schema::parse_organization(&body)?;
    tracing::info!(email = %req.email, "received request to create new free organization");
    let msg = state.organizations.create(&req.email).await?;
    Ok(Json(StatusMessage::new(msg)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/environments/create-organization",
    tag = "environments",
    request_body = OrganizationRequest,
    responses(
        (status = 200, description = "Free organization environment deleted", body = StatusMessage),
        (status = 404, description = "No environment for this email", body = StatusMessage)
    )
)]
async fn delete_organization_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<StatusMessage>> {
    let req = schema::parse_organization(&body)?;
    tracing::info!(email = %req.email, "received request to delete existing free organization");
    let msg = state.organizations.delete(&req.email).await?;
    Ok(Json(StatusMessage::new(msg)))
}

/// Health check handler
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "environments",
    responses((status = 200, description = "Service is up", body = StatusMessage))
)]
async fn health_handler() -> Json<StatusMessage> {
    Json(StatusMessage::new("harp-environment is healthy"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MemoryPublisher;
    use axum::{body::Body, http::StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt; // For .oneshot() testing

    const SECRET: &str = "rest-test-secret";

    fn app() -> (Router, Arc<MemoryPublisher>, Storage) {
        let storage = Storage::temporary().expect("temporary storage");
        let publisher = Arc::new(MemoryPublisher::default());
        let organizations = OrganizationService::new(
            storage.clone(),
            "http://127.0.0.1:9/scenarios",
            "http://127.0.0.1:9/users",
            Duration::from_secs(1),
        )
        .unwrap();
        let state = AppState::new(
            storage.clone(),
            publisher.clone(),
            organizations,
            TokenVerifier::new(SECRET),
            "environment-update",
        );
        (create_router(state), publisher, storage)
    }

    fn bearer() -> String {
        let token = TokenVerifier::new(SECRET).issue("tester", 300).unwrap();
        format!("Bearer {token}")
    }

    async fn send(app: &Router, req: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn put_env(body: Value, auth: Option<String>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .uri("/api/v1/environments")
            .method("PUT")
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app();
        let (status, body) = send(&app, get_req("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["msg"].as_str().unwrap().contains("healthy"));
    }

    #[tokio::test]
    async fn test_mutations_require_token() {
        let (app, publisher, storage) = app();
        let (status, body) = send(&app, put_env(json!({"env_name": "alpha"}), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["msg"].is_string());

        let (status, _) = send(
            &app,
            put_env(json!({"env_name": "alpha"}), Some("Bearer not-a-jwt".into())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get_req("/api/v1/environments/client/all")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert!(storage.is_empty());
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_lookup_by_id_and_name() {
        let (app, publisher, _) = app();
        let (status, created) = send(
            &app,
            put_env(
                json!({"env_name": "alpha", "env_settings": {"description": "d", "default_scenario": 1}}),
                Some(bearer()),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_i64().expect("id assigned");

        let (status, by_id) = send(&app, get_req(&format!("/api/v1/environments/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_id["msg"]["env_name"], json!("alpha"));

        let (status, by_name) = send(&app, get_req("/api/v1/environments/alpha")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_name["msg"]["id"], json!(id));

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "environment-update");
    }

    #[tokio::test]
    async fn test_invalid_payload_is_bad_request() {
        let (app, publisher, _) = app();
        let (status, body) = send(&app, put_env(json!({"env_settings": {}}), Some(bearer()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["msg"].as_str().unwrap().contains("env_name"));
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found_before_validation() {
        let (app, _, _) = app();
        let req = axum::http::Request::builder()
            .uri("/api/v1/environments/77")
            .method("POST")
            .header("authorization", bearer())
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let (app, _, _) = app();
        let (status, body) = send(&app, get_req("/api/v1/environments/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["msg"].is_string());
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let (app, _, _) = app();
        let (status, doc) = send(&app, get_req("/api/v1/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/api/v1/environments/create-organization"].is_object());
    }

    #[test]
    fn numeric_keys_only_match_digits() {
        assert_eq!(numeric_id("12"), Some(12));
        assert_eq!(numeric_id("-1"), None);
        assert_eq!(numeric_id("a@b.com"), None);
        assert_eq!(numeric_id(""), None);
        assert!(require_id("0").is_err());
    }
}
