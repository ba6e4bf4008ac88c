//! Authenticated principal lookup.

use axum::{Extension, Json};
use pulse_core::models::auth::AuthenticatedPrincipal;

use crate::middleware::auth::AuthenticatedUser;

/// `GET /api/auth/verify`: the principal behind the presented credentials.
pub async fn verify_handler(
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<AuthenticatedPrincipal> {
    Json(user.0)
}
