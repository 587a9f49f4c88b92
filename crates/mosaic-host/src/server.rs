use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use tokio::sync::broadcast;

use crate::config::HostConfig;
use crate::http::{router, AppState};

/// Serve the catalogue until the shutdown channel fires.
pub async fn serve(
    config: &HostConfig,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    let addr = listener.local_addr().context("local addr")?;
    tracing::info!("catalogue listening on http://{addr}");

    let app = router(state).layer(DefaultBodyLimit::max(config.max_body));
    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .with_context(|| format!("serve {addr}"))
}
