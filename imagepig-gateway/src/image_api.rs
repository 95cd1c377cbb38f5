//! Axum router for the image API.
//!
//! Provides:
//! - `GET  /` liveness
//! - `GET  /api/images/health` credential status
//! - `POST /api/images/{operation}` for each of the seven ImagePig operations

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRef, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get, post};
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::MAX_BODY_BYTES;
use crate::error::ApiError;
use crate::gateway::ProviderGateway;
use crate::normalize::{Operation, normalize};
use crate::session_auth::{SessionAuth, SessionKeys};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ProviderGateway>,
    pub sessions: SessionKeys,
}

impl AppState {
    pub fn new(gateway: ProviderGateway, sessions: SessionKeys) -> Self {
        Self {
            gateway: Arc::new(gateway),
            sessions,
        }
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "API is running",
        "hasApiKey": state.gateway.has_credential(),
    }))
}

async fn image_health(_auth: SessionAuth, State(state): State<AppState>) -> impl IntoResponse {
    match state.gateway.credential() {
        Ok(key) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "apiKeyConfigured": true,
                "apiKeyLength": key.as_str().chars().count(),
                "apiKeyPrefix": key.masked(),
                "message": "Image API is ready",
            })),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "unhealthy",
                "apiKeyConfigured": false,
                "error": ApiError::from(err).body.error,
                "message": "Image API is not configured properly",
            })),
        ),
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

async fn run_operation(
    operation: Operation,
    SessionAuth(subject): SessionAuth,
    state: AppState,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let request = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    tracing::debug!(operation = operation.route(), %subject, "image request");

    let payload =
        normalize(operation, &request).map_err(|err| ApiError::for_operation(operation, err))?;
    let response = state
        .gateway
        .invoke(operation, &payload)
        .await
        .map_err(|err| ApiError::for_operation(operation, err))?;
    Ok(Json(response))
}

fn operation_route(operation: Operation) -> MethodRouter<AppState> {
    post(
        move |auth: SessionAuth,
              State(state): State<AppState>,
              body: Result<Json<Value>, JsonRejection>| async move {
            run_operation(operation, auth, state, body).await
        },
    )
}

// ---------------------------------------------------------------------------
// Router builder
// ---------------------------------------------------------------------------

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(err)) => {
            tracing::warn!(error = %err, "invalid CORS_ORIGIN; allowing any origin");
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the image API router with all endpoints and CORS support.
pub fn image_api_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let mut images = Router::new().route("/health", get(image_health));
    for operation in Operation::ALL {
        images = images.route(&format!("/{}", operation.route()), operation_route(operation));
    }

    Router::new()
        .route("/", get(health))
        .nest("/api/images", images)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}
