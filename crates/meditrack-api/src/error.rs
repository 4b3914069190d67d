//! API error handling
//!
//! Every failure leaving a handler is an [`AppError`]; this is the only place
//! where error kinds are mapped to HTTP status codes.

use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
        FromRequest,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use meditrack_core::{MediTrackError, UploadError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Internal details (development mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Error response body: `{"error": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

/// Detail of a 500 response, attached as a response extension so the
/// `error_details` middleware can expose it in development.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Duplicate(String),
    Unauthenticated(String),
    NotFound(String),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Uniform 401 used for every credential or token failure
    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated("Authentication required".to_string())
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("{resource} not found"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, detail) = match self {
            AppError::Validation(msg) => (ApiError::new("VALIDATION_ERROR", msg), None),
            AppError::Duplicate(msg) => (ApiError::new("DUPLICATE", msg), None),
            AppError::Unauthenticated(msg) => (ApiError::new("UNAUTHENTICATED", msg), None),
            AppError::NotFound(msg) => (ApiError::new("NOT_FOUND", msg), None),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (ApiError::internal_error(), Some(InternalErrorDetail(msg)))
            }
        };

        let mut response = (status, Json(ErrorEnvelope { error })).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

impl From<MediTrackError> for AppError {
    fn from(err: MediTrackError) -> Self {
        match err {
            MediTrackError::Validation(msg) => AppError::Validation(msg),
            MediTrackError::Duplicate(msg) => AppError::Duplicate(msg),
            MediTrackError::NotFound(msg) => AppError::NotFound(msg),
            MediTrackError::Database(msg) => AppError::Internal(msg),
            MediTrackError::Config(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            MediTrackError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::UnsupportedType(_) | UploadError::Empty => {
                AppError::Validation(err.to_string())
            }
            UploadError::Io(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// `Json` extractor whose rejections use the API error body
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
