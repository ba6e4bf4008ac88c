//! # pulse_api
//!
//! HTTP API library for Pulse: SSO login and callback, authenticated routes,
//! and the request authentication middleware.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use pulse_core::auth::repository::PrincipalRepository;
use pulse_core::auth::resolver::AuthResolver;
use pulse_core::auth::session::SessionStore;
use pulse_core::auth::sso::{SsoClient, SsoError};
use pulse_core::auth::token::TokenCodec;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{auth, health, share, sso};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub codec: Arc<TokenCodec>,
    pub sessions: Arc<dyn SessionStore>,
    /// `None` when SSO is disabled.
    pub sso: Option<Arc<SsoClient>>,
    pub resolver: AuthResolver,
}

impl AppState {
    /// Wire the auth components from `config` over the given backends.
    pub fn new(
        config: ApiConfig,
        users: Arc<dyn PrincipalRepository>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, SsoError> {
        let codec = Arc::new(TokenCodec::new(&config.auth));
        let sso = match &config.sso {
            Some(sso_config) => Some(Arc::new(SsoClient::new(sso_config.clone(), users.clone())?)),
            None => None,
        };

        let mut resolver =
            AuthResolver::new(&config.auth, codec.clone(), sessions.clone(), users);
        if let Some(sso) = &sso {
            resolver = resolver.with_sso(sso.clone());
        }

        Ok(Self {
            config,
            codec,
            sessions,
            sso,
            resolver,
        })
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/api/health", get(health::health_handler))
        .route("/sso/login", get(sso::login_handler))
        .route("/sso/callback", get(sso::callback_handler));

    // Protected routes (require a resolved principal)
    let protected = Router::new()
        .route("/api/auth/verify", get(auth::verify_handler))
        .route(
            "/api/share/{share_id}/token",
            post(share::create_share_token_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
