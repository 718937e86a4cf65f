//! Authentication API Endpoints
//! Mission: Expose register, login, validate and refresh over HTTP

use crate::auth::{
    models::{
        LoginRequest, LoginResponse, RefreshTokenRequest, RegisterRequest, RegisterResponse,
        Status, ValidateTokenRequest, ValidateTokenResponse,
    },
    service::CredentialService,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<CredentialService>,
}

/// Build the auth router
pub fn router(service: Arc<CredentialService>) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/validate", post(validate_token))
        .route("/auth/refresh", post(refresh_token))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(AuthState { service })
}

/// Wire code for each service outcome
pub fn http_status(status: Status) -> StatusCode {
    match status {
        Status::Ok => StatusCode::OK,
        Status::Created => StatusCode::CREATED,
        Status::Conflict => StatusCode::CONFLICT,
        Status::Forbidden => StatusCode::FORBIDDEN,
        Status::NotFound => StatusCode::NOT_FOUND,
        Status::BadRequest => StatusCode::BAD_REQUEST,
        Status::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Register endpoint - POST /auth/register
pub async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthApiError> {
    let payload = request_body(payload)?;
    let service = state.service.clone();
    let response = run_blocking(move || service.register(&payload)).await?;
    Ok((http_status(response.status), Json(response)))
}

/// Login endpoint - POST /auth/login
pub async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoginResponse>), AuthApiError> {
    let payload = request_body(payload)?;
    let service = state.service.clone();
    let response = run_blocking(move || service.login(&payload)).await?;
    Ok((http_status(response.status), Json(response)))
}

/// Validate endpoint - POST /auth/validate
pub async fn validate_token(
    State(state): State<AuthState>,
    payload: Result<Json<ValidateTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ValidateTokenResponse>), AuthApiError> {
    let payload = request_body(payload)?;
    let service = state.service.clone();
    let response = run_blocking(move || service.validate_token(&payload)).await?;
    Ok((http_status(response.status), Json(response)))
}

/// Refresh endpoint - POST /auth/refresh
pub async fn refresh_token(
    State(state): State<AuthState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoginResponse>), AuthApiError> {
    let payload = request_body(payload)?;
    let service = state.service.clone();
    let response = run_blocking(move || service.refresh_token(&payload)).await?;
    Ok((http_status(response.status), Json(response)))
}

/// Health endpoint - GET /health
pub async fn health(State(state): State<AuthState>) -> impl IntoResponse {
    let service = state.service.clone();
    let serving = run_blocking(move || service.store().ping().is_ok())
        .await
        .unwrap_or(false);

    if serving {
        (StatusCode::OK, Json(json!({ "status": "serving" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_serving" })),
        )
    }
}

// Missing content type, broken JSON and mistyped fields all end up here.
// The serde detail is logged, never returned.
fn request_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!(
            status = %rejection.status(),
            reason = %rejection.body_text(),
            "request body rejected"
        );
        AuthApiError::MalformedBody
    })
}

// bcrypt and SQLite block; keep them off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T, AuthApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("auth worker task failed: {}", e);
        AuthApiError::WorkerFailed
    })
}

/// Failures raised before or around the credential service,
/// rendered in the same `{status, error}` shape as service results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthApiError {
    /// Body missing, not JSON, or not the expected shape
    MalformedBody,
    /// The blocking worker panicked or was cancelled
    WorkerFailed,
}

impl AuthApiError {
    pub fn status(&self) -> Status {
        match self {
            AuthApiError::MalformedBody => Status::BadRequest,
            AuthApiError::WorkerFailed => Status::InternalError,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthApiError::MalformedBody => "malformed request body",
            AuthApiError::WorkerFailed => "internal server error",
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            http_status(status),
            Json(json!({ "status": status, "error": self.message() })),
        )
            .into_response()
    }
}
