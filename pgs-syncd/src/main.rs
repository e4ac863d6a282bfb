//! pgs-syncd - Procedure Gallery Sync daemon
//!
//! Synchronizes a medical-procedure gallery dataset from a remote SaaS
//! API into a WordPress site and serves sync status over HTTP.

use anyhow::Result;
use clap::Parser;
use pgs_common::config::{self, SyncConfig};
use pgs_common::db::init_database;
use pgs_syncd::{build_router, scheduler, AppState};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "pgs-syncd", about = "Procedure gallery sync daemon")]
struct Args {
    /// Data directory (database and default config location)
    #[arg(long)]
    data_dir: Option<String>,

    /// Config file path (defaults to <data-dir>/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override, host:port
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting Procedure Gallery Sync daemon (pgs-syncd) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir.as_deref());
    std::fs::create_dir_all(&data_dir)?;
    info!("Data directory: {}", data_dir.display());

    let config_path = args
        .config
        .unwrap_or_else(|| config::default_config_path(&data_dir));
    let config = SyncConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path.display());

    let db_path = config::database_path(&data_dir);
    let db = init_database(&db_path).await?;

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState::new(db, config);

    tokio::spawn(scheduler::run(state.clone()));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("pgs-syncd listening on http://{bind}");
    info!("Health check: http://{bind}/health");

    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
