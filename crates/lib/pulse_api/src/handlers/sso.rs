//! SSO login and callback endpoints.
//!
//! Both answer with a `302 Found`; failures send the browser back to the
//! sign-in page with a coarse `error` tag and never expose details.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use pulse_core::auth::callback::{CallbackParams, complete_callback};
use tracing::warn;

use crate::AppState;
use crate::models::LoginParams;

const SIGNIN_PATH: &str = "/signin";
const DASHBOARD_PATH: &str = "/dashboard";

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

fn with_query(path: &str, key: &str, value: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    format!("{path}?{query}")
}

fn signin_error(tag: &str) -> Response {
    found(&with_query(SIGNIN_PATH, "error", tag))
}

/// `GET /sso/login`: redirect to the identity provider.
pub async fn login_handler(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Response {
    let Some(sso) = &state.sso else {
        warn!("SSO login requested but SSO is not configured");
        return signin_error("sso_error");
    };
    match sso.authorization_url(params.redirect_url.as_deref()) {
        Ok(request) => found(&request.url),
        Err(e) => {
            warn!(error = %e, "failed to build authorization URL");
            signin_error("sso_error")
        }
    }
}

/// `GET /sso/callback`: finish the login and hand the browser its token.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(sso) = &state.sso else {
        warn!("SSO callback received but SSO is not configured");
        return signin_error("sso_error");
    };
    match complete_callback(
        sso,
        state.sessions.as_ref(),
        &state.codec,
        &params,
        state.config.auth.auth_session_ttl_secs,
    )
    .await
    {
        Ok(token) => found(&with_query(DASHBOARD_PATH, "auth", &token)),
        Err(e) => {
            warn!(error = %e, "SSO callback failed");
            signin_error(e.error_tag())
        }
    }
}
