use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tenderdesk_api::{
    build_router, cache::Cache, database::DatabaseManager, integrations::Integrations, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenderdesk_api=info,tower_http=info")),
        )
        .init();

    let config = tenderdesk_api::config::config().clone();
    tracing::info!("Starting TenderDesk API in {:?} mode", config.environment);

    let pool = DatabaseManager::connect(&config.database).await?;
    DatabaseManager::migrate(&pool).await?;

    let cache = Cache::from_config(&config.cache).await;
    let integrations = Integrations::from_config(&config.integrations)?;
    let port = config.api.port;
    let cleanup_every = Duration::from_secs(config.api.rate_limit_cleanup_secs.max(1));

    let state = AppState::new(pool, cache, config, integrations);
    spawn_rate_limit_cleanup(&state, cleanup_every);

    let app = build_router(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("TenderDesk API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Drop expired rate-limit windows so the table does not grow without bound
fn spawn_rate_limit_cleanup(state: &AppState, every: Duration) {
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = limiter.cleanup();
            if removed > 0 {
                tracing::debug!(removed, "Expired rate limit windows removed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
