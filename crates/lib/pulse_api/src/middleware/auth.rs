//! Authentication middleware: resolves request credentials to a principal.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use pulse_core::models::auth::AuthenticatedPrincipal;

use crate::AppState;
use crate::error::AppError;

/// Principal resolved for the current request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthenticatedPrincipal);

/// Axum middleware: runs credential resolution and injects `AuthenticatedUser`
/// into request extensions. Requests without a resolved principal are
/// rejected with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = state
        .resolver
        .check_auth(request.headers())
        .await
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid credentials".into()))?;

    let principal = ctx
        .principal
        .ok_or_else(|| AppError::Unauthorized("No authenticated user".into()))?;

    request.extensions_mut().insert(AuthenticatedUser(principal));

    Ok(next.run(request).await)
}
