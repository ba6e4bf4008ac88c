//! Liveness endpoint.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /api/health`: version and which optional backends are configured.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: pulse_core::version().to_string(),
        sso_enabled: state.sso.is_some(),
        session_store_enabled: state.sessions.enabled(),
    })
}
