//! Signalling endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_engine::{SessionError, SessionManager};
use relay_ipc::SessionDescription;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// State shared by the handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

/// Session failure mapped to an HTTP response.
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/offer", post(offer))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept a peer's offer and reply with the answer.
pub async fn offer(
    State(state): State<AppState>,
    Json(offer): Json<SessionDescription>,
) -> Result<Json<SessionDescription>, ApiError> {
    match state.sessions.handle_offer(offer).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            warn!("Offer rejected: {}", e);
            Err(e.into())
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.sessions.active_connections(),
    })
}
