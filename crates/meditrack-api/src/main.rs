//! MediTrack API Server
//!
//! REST API server for personal medical records.

use anyhow::Context;
use clap::Parser;
use meditrack_api::{create_router, state::AppState};
use meditrack_core::{AppConfig, LoggingConfig, MemoryStore, PgStore, Store, UploadStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meditrack-api")]
#[command(about = "MediTrack REST API server")]
#[command(version)]
struct Args {
    /// Keep all records in memory instead of PostgreSQL (lost on exit)
    #[arg(long)]
    in_memory: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("meditrack_api=info,tower_http=info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env is optional; real environment variables take precedence
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Invalid configuration")?;
    init_tracing(&config.logging);
    tracing::debug!(?config, "Configuration loaded");

    let store: Arc<dyn Store> = if args.in_memory {
        tracing::warn!("Using in-memory store; records are lost on shutdown");
        Arc::new(MemoryStore::new())
    } else {
        let store = PgStore::connect_lazy(&config.database)
            .context("Failed to configure PostgreSQL pool")?;
        match store.migrate().await {
            Ok(()) => tracing::info!("Database schema is up to date"),
            Err(e) => tracing::warn!(error = %e, "Database migration failed; continuing"),
        }
        Arc::new(store)
    };

    UploadStore::new(&config.uploads)
        .ensure_dir()
        .await
        .context("Failed to create upload directory")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, store).context("Failed to build application state")?);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("MediTrack API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
