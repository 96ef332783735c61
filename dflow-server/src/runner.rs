use anyhow::{Context, Result};
use dflow_core::init_tracing;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::components::{build_components, AppComponents};
use crate::config::AppConfig;
use crate::webhook::router;

/// Upper bound on the sweep interval so long retentions still release memory regularly.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Main entry: init logging, build components, bind the listener, then serve until ctrl-c.
#[instrument(skip(config), fields(listen_addr = %config.listen_addr))]
pub async fn run_server(config: AppConfig) -> Result<()> {
    init_tracing(&config.log_file)?;

    info!(
        platform = %config.platform.as_str(),
        skill_path = %config.skills.path.display(),
        retention_ms = config.retention.as_millis() as u64,
        enable_ask_retry = config.enable_ask_retry,
        "Initializing dflow"
    );

    let components = build_components(&config)?;
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    serve(
        listener,
        components,
        config.webhook_path.clone(),
        config.retention,
        shutdown_signal(),
    )
    .await
}

/// Serves the webhook on `listener` with a session sweeper running alongside, until `shutdown`
/// resolves. Used by tests with their own listener and shutdown trigger.
pub async fn serve<F>(
    listener: TcpListener,
    components: AppComponents,
    webhook_path: String,
    retention: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = components
        .store
        .spawn_sweeper(retention.min(MAX_SWEEP_INTERVAL));
    let app = router(components.processor.clone(), &webhook_path);

    info!(
        addr = %listener.local_addr()?,
        webhook_path = %webhook_path,
        "dflow started"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed");

    sweeper.abort();
    info!(sessions = components.store.len(), "dflow stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
