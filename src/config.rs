use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_DB_PATH: &str = "miles_tracker.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Settings shared by the CLI and the backend. Flags win over environment
/// variables, which win over the defaults.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// SQLite database file
    #[arg(long = "db", global = true, env = "MILES_TRACKER_DB", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Log filter, e.g. "info" or "miles_tracker=debug"
    #[arg(long = "log", global = true, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[command(flatten)]
    pub base: Config,

    /// Address the HTTP API listens on
    #[arg(long = "addr", env = "MILES_TRACKER_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: SocketAddr,
}
