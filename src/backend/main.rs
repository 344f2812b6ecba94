use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use miles_tracker::api::{AppState, create_router};
use miles_tracker::config::ServerConfig;
use miles_tracker::db;

/// JSON API serving card cycle summaries
#[derive(Parser)]
#[command(name = "backend", version, about)]
struct Args {
    #[command(flatten)]
    server: ServerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.server;
    miles_tracker::init_tracing(&config.base.log_filter);

    let conn = db::init_db(&config.base.db_path)
        .with_context(|| format!("Failed to open database {}", config.base.db_path.display()))?;
    let app = create_router(AppState::new(conn));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, db = %config.base.db_path.display(), "backend listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
