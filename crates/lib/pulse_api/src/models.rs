//! Request and response bodies.

use serde::{Deserialize, Serialize};

/// Error body returned by every failing API route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `GET /api/health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(rename = "ssoEnabled")]
    pub sso_enabled: bool,
    #[serde(rename = "sessionStoreEnabled")]
    pub session_store_enabled: bool,
}

/// `POST /api/share/{share_id}/token` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareTokenResponse {
    pub token: String,
}

/// `GET /sso/login` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginParams {
    pub redirect_url: Option<String>,
}
