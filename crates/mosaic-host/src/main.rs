use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mosaic_catalogue::{DynCatalogue, Engine, FsDeployer, MemCatalogue, SqliteCatalogue};
use mosaic_host::http::AppState;
use mosaic_host::{serve, Coordinator, HostConfig, HttpFetcher};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mosaic-host", version, about = "Mosaic local catalogue server")]
struct Cli {
    /// Bind address (env: MOSAIC_BIND)
    #[arg(long, env = "MOSAIC_BIND", default_value = "127.0.0.1:7600")]
    bind: SocketAddr,

    /// Data directory for the catalogue database and widget artifacts
    /// (env: MOSAIC_DATA)
    #[arg(long, env = "MOSAIC_DATA", default_value = "./mosaic")]
    data: PathBuf,

    /// Keep the catalogue in memory instead of SQLite
    #[arg(long)]
    memory: bool,

    /// Remote fetch timeout in seconds (env: MOSAIC_FETCH_TIMEOUT)
    #[arg(long, env = "MOSAIC_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();
    let config = HostConfig {
        bind: cli.bind,
        data_dir: cli.data,
        fetch_timeout: Duration::from_secs(cli.fetch_timeout),
        ..HostConfig::default()
    };

    let store: DynCatalogue = if cli.memory {
        Arc::new(MemCatalogue::new())
    } else {
        Arc::new(SqliteCatalogue::open(config.data_dir.join("catalogue.db"))?)
    };
    let deployer = Arc::new(FsDeployer::new(config.data_dir.join("widgets")));
    let engine = Engine::new(store, deployer);
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
    let state = AppState {
        coordinator: Arc::new(Coordinator::new(engine, fetcher)),
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            let _ = signal_tx.send(());
        }
    });

    serve(&config, state, shutdown_tx).await
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}
