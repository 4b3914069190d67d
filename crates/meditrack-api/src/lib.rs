//! MediTrack API - REST server for personal medical records
//!
//! Accounts sign up and log in for a bearer token; every doctor and report
//! they create afterwards is visible only to them.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::AppError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let uploads = &state.config.uploads;

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            // Wildcards cannot be combined with credentials
            Ok(value) if origin != "*" => Some(value),
            _ => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", routes::api_routes(state.clone()))
        .nest_service(&uploads.public_path, ServeDir::new(&uploads.dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(route_not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.config.environment,
            middleware::error_details_middleware,
        ))
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

#[cfg(any(test, feature = "test-utils"))]
pub use testing::{create_router_for_testing, create_router_for_testing_with_config};

/// Test fixtures: in-memory store, light password hashing and a fixed secret
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use meditrack_core::{AppConfig, Environment, MemoryStore, PasswordConfig};

    pub const TEST_JWT_SECRET: &str = "test-secret-key-for-integration-tests-only";

    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.environment = Environment::Production;
        config.auth.jwt_secret = TEST_JWT_SECRET.to_string();
        config.auth.password = PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        };
        config.uploads.dir =
            std::env::temp_dir().join(format!("meditrack-uploads-{}", uuid::Uuid::new_v4()));
        config
    }

    pub fn test_state_with_config(config: AppConfig) -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new());
        Arc::new(AppState::new(config, store).expect("test config has a signing secret"))
    }

    pub fn test_state() -> Arc<AppState> {
        test_state_with_config(test_config())
    }

    /// Router over a fresh in-memory store
    pub fn create_router_for_testing() -> Router {
        create_router(test_state())
    }

    pub fn create_router_for_testing_with_config(config: AppConfig) -> Router {
        create_router(test_state_with_config(config))
    }
}
