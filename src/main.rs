use std::sync::Arc;

use memorial_portrait_server::{
    config::Config, create_app, services::metrics::MetricsService, AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memorial_portrait_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let metrics = Arc::new(MetricsService::install()?);
    let state = AppState::build(config.clone(), metrics).await?;

    // Anything left in the upload directory belongs to a previous process
    let swept = state.uploads.sweep().await?;
    if swept > 0 {
        tracing::warn!(count = swept, "Deleted uploads left over from a previous run");
    }

    let uploads = state.uploads.clone();
    let ttl = config.upload_ttl();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let expired = uploads.expire_older_than(ttl).await;
            if expired > 0 {
                tracing::info!(count = expired, "Expired unclaimed uploads");
            }
        }
    });

    tracing::info!(
        provider = ?config.generation_provider,
        enabled = config.generation_enabled,
        daily_cap = config.daily_generation_cap,
        "Generation configured"
    );

    let app = create_app(state);
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("Server running at http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
