//! Application state shared across handlers

use meditrack_core::{AppConfig, Store, UploadStore};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::jwt::{JwtError, TokenService};
use crate::auth::service::AuthService;

/// Application state, built once at startup and shared as `Arc<AppState>`
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Record storage
    pub store: Arc<dyn Store>,
    /// Token issuing and verification
    pub tokens: TokenService,
    /// Account creation and credential checks
    pub auth: AuthService,
    /// Report file storage
    pub uploads: UploadStore,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Build the state. Fails if no signing secret is configured.
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Result<Self, JwtError> {
        let tokens = TokenService::new(&config.auth)?;
        let auth = AuthService::new(store.clone(), config.auth.password.clone());
        let uploads = UploadStore::new(&config.uploads);

        Ok(Self {
            config,
            store,
            tokens,
            auth,
            uploads,
            start_time: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
