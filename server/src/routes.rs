//! HTTP route handlers for the relay server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /` - Health check endpoint
//! - `GET /hello`, `GET /hello/{name}`, `POST /hello` - Greeting endpoints
//! - `GET /ws` - WebSocket relay endpoint (see [`crate::transport`])
//!
//! Every other path answers `404` with a JSON error body. All responses carry
//! permissive CORS headers and every request is traced.
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_server::config::Config;
//! use relay_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::Config;
use crate::lifecycle::LifecycleManager;
use crate::transport::get_ws;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Connection lifecycle manager backing the WebSocket relay.
    pub lifecycle: LifecycleManager,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates a new application state with an empty connection registry.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_lifecycle(config, LifecycleManager::default())
    }

    /// Creates application state around an existing lifecycle manager.
    ///
    /// Useful for tests that need to inspect the registry.
    #[must_use]
    pub fn with_lifecycle(config: Config, lifecycle: LifecycleManager) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle,
            start_time: Instant::now(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/hello", get(get_hello).post(post_hello))
        .route("/hello/{name}", get(get_hello_name))
        .route("/ws", get(get_ws))
        .fallback(unknown_endpoint)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error Responses
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Errors returned by the HTTP handlers, rendered as [`ErrorResponse`].
#[derive(Debug)]
pub enum ApiError {
    /// No route matches the request path.
    UnknownEndpoint,

    /// The request body could not be decoded.
    InvalidBody(JsonRejection),

    /// The greeting name was blank.
    InvalidName,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::UnknownEndpoint => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("unknown endpoint").with_code("unknown_endpoint"),
            ),
            Self::InvalidBody(rejection) => (
                rejection.status(),
                ErrorResponse::new(rejection.body_text()).with_code("invalid_body"),
            ),
            Self::InvalidName => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("name must not be empty").with_code("invalid_name"),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection)
    }
}

/// Fallback for paths no route matches.
async fn unknown_endpoint(uri: Uri) -> ApiError {
    debug!(path = %uri.path(), "Unknown endpoint");
    ApiError::UnknownEndpoint
}

// ============================================================================
// GET / - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET / - Health check endpoint.
///
/// Always answers `200 {"status":"ok"}` while the process is serving.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// /hello - Greetings
// ============================================================================

/// Response body for the greeting endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct GreetingResponse {
    pub message: String,
}

impl GreetingResponse {
    fn for_name(name: &str) -> Self {
        Self {
            message: format!("Hello, {name}!"),
        }
    }
}

/// Request body for `POST /hello`.
#[derive(Debug, Deserialize)]
pub struct GreetingRequest {
    pub name: String,
}

/// GET /hello - Greets the world.
async fn get_hello() -> Json<GreetingResponse> {
    Json(GreetingResponse::for_name("world"))
}

/// GET /hello/{name} - Greets `name`.
async fn get_hello_name(Path(name): Path<String>) -> Result<Json<GreetingResponse>, ApiError> {
    greet(&name)
}

/// POST /hello - Greets the `name` in the JSON body.
async fn post_hello(
    payload: Result<Json<GreetingRequest>, JsonRejection>,
) -> Result<Json<GreetingResponse>, ApiError> {
    let Json(request) = payload?;
    greet(&request.name)
}

fn greet(name: &str) -> Result<Json<GreetingResponse>, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidName);
    }
    Ok(Json(GreetingResponse::for_name(name)))
}

// ============================================================================
// Tests
// ============================================================================
