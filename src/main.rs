use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mindspace_api::config::Config;
use mindspace_api::db::{self, DocumentStore, PgDocumentStore};
use mindspace_api::{build_router, memory_store, AppState};

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
        return Ok(Arc::new(memory_store()));
    };

    let pool = db::postgres::create_pool(url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = PgDocumentStore::new(pool);
    store
        .migrate()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mindspace_api=debug,tower_http=debug".into());
    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store = open_store(&config).await?;
    let addr = config.listen_addr();
    let state = AppState::new(config, store);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
