/// Authentication middleware for protecting routes
///
/// Extracts and verifies the bearer token from the Authorization header. On
/// success an [`AuthContext`] is added to the request extensions; handlers take
/// it as an extractor argument.
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of the authenticated caller.
///
/// Only [`auth_middleware`] creates one; it cannot be built from client input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    account_id: Uuid,
}

impl AuthContext {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .ok_or_else(AppError::unauthenticated)
    }
}

/// Bearer token from the Authorization header, if well formed and non-empty
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Authentication middleware that requires a valid bearer token
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(AppError::unauthenticated());
    };

    let account_id = match state.tokens.verify(token) {
        Ok(id) => id,
        Err(_) => {
            audit_log(&AuditEvent::InvalidToken {
                client: ClientInfo::from_headers(request.headers()),
            });
            return Err(AppError::unauthenticated());
        }
    };

    request.extensions_mut().insert(AuthContext { account_id });
    Ok(next.run(request).await)
}
