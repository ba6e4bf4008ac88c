//! Share token issuance.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use pulse_core::auth::AuthError;
use pulse_core::auth::permissions::{ALL, WEBSITE_UPDATE, has_permission};
use pulse_core::models::auth::ShareClaims;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::ShareTokenResponse;

/// `POST /api/share/{share_id}/token`: sign a share token for `share_id`.
///
/// Requires `website:update` or `all`.
pub async fn create_share_token_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(share_id): Path<String>,
) -> AppResult<Json<ShareTokenResponse>> {
    let principal = &user.0.principal;
    if !has_permission(principal.role.as_str(), [WEBSITE_UPDATE, ALL]) {
        return Err(AppError::Forbidden(format!(
            "role '{}' may not share websites",
            principal.role
        )));
    }

    let token = state
        .codec
        .sign_share(&ShareClaims {
            share_id: share_id.clone(),
        })
        .map_err(AuthError::from)?;
    info!(principal_id = %principal.id, share_id = %share_id, "issued share token");
    Ok(Json(ShareTokenResponse { token }))
}
