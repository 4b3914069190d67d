//! Signup and login handlers

use crate::audit::ClientInfo;
use crate::auth::{AuthResponse, LoginRequest, SignupRequest};
use crate::error::{AppError, ApiJson};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use meditrack_core::Account;
use std::sync::Arc;

fn auth_response(state: &AppState, account: &Account, message: &str) -> Result<AuthResponse, AppError> {
    let issued = state
        .tokens
        .issue(account.id)
        .map_err(|e| AppError::Internal(format!("Failed to issue token: {e}")))?;

    Ok(AuthResponse {
        message: message.to_string(),
        data: account.profile(),
        token: issued.token,
        expires_in: issued.expires_in,
    })
}

/// Create an account
///
/// The email is trimmed and lowercased before the uniqueness check. Returns the
/// new account together with a bearer token.
#[utoipa::path(
    post,
    path = "/api/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ErrorEnvelope),
        (status = 409, description = "Email already registered", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .auth
        .signup(request, ClientInfo::from_headers(&headers))
        .await?;
    let response = auth_response(&state, &account, "Account created successfully")?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Log in with email and password
///
/// An unknown email and a wrong password produce the same 401 response.
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing fields", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .auth
        .login(request, ClientInfo::from_headers(&headers))
        .await?;
    let response = auth_response(&state, &account, "Login successful")?;

    Ok(Json(response))
}
