//! Profile handlers for the authenticated account

use crate::auth::{AuthContext, ProfileUpdateRequest};
use crate::error::{AppError, ApiJson};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use meditrack_core::AccountProfile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub data: AccountProfile,
}

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/api/profile",
    tag = "profile",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
        (status = 404, description = "Account no longer exists", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth.find_by_id(auth.account_id()).await?;
    Ok(Json(ProfileResponse {
        data: account.profile(),
    }))
}

/// Update the caller's profile
///
/// Only fields present in the body change. A new password is hashed before it
/// is stored; a new email must not belong to another account.
#[utoipa::path(
    put,
    path = "/api/profile",
    tag = "profile",
    security(("bearer_auth" = [])),
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Invalid field", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
        (status = 409, description = "Email already registered", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(request): ApiJson<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .auth
        .update_profile(auth.account_id(), request)
        .await?;
    Ok(Json(ProfileResponse {
        data: account.profile(),
    }))
}
