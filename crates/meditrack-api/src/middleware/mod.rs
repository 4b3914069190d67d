//! Response middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use meditrack_core::Environment;

use crate::error::{ApiError, ErrorEnvelope, InternalErrorDetail};

/// Re-render 500 responses with their internal detail when the environment
/// allows it. In production the generic body is left untouched.
pub async fn error_details_middleware(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let Some(InternalErrorDetail(detail)) = response.extensions_mut().remove::<InternalErrorDetail>()
    else {
        return response;
    };
    if !environment.exposes_error_details() {
        return response;
    }

    let body = ErrorEnvelope {
        error: ApiError::internal_error().with_details(detail),
    };
    (response.status(), Json(body)).into_response()
}
