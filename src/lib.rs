//! Credit-card spending tracker: billing cycles, spend thresholds and
//! category bonus caps, backed by SQLite.

pub mod api;
pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod models;
pub mod money;
pub mod report;
pub mod spending;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use cycle::{CyclePolicy, DateRange, calendar_month_range, current_cycle};
pub use error::{Result, TrackerError};
pub use spending::{CardSpendingSummary, CategoryCapStatus, ThresholdStatus, summarize};

static INIT_TRACING: Once = Once::new();

/// Installs the global fmt subscriber once. Logs go to stderr so table output
/// on stdout stays clean.
pub fn init_tracing(filter: &str) {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
