use std::sync::Arc;

use anyhow::Context;

use learnhub_api::app::{build_app, services::build_services};
use learnhub_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    learnhub_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    tracing::debug!(?settings, "loaded settings");

    let (services, notifications) = build_services(&settings).await?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router (and with it every notifier handle) is gone; flush what is queued.
    notifications.drain().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
