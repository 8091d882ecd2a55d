use std::io;
use std::path::Path;

use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PACNEW_LOG";

/// Installs the stderr subscriber. `--debug` wins over `PACNEW_LOG`, which
/// wins over the `warn` default.
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Serialize)]
pub struct ActionRecord<'a> {
    pub timestamp: &'a str,
    pub action: &'a str,
    pub path: &'a Path,
    pub outcome: &'a str,
}

/// Emits one structured event per reconciliation step.
pub fn record_action(action: &str, path: &Path, outcome: &str) {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let entry = ActionRecord {
        timestamp: &timestamp,
        action,
        path,
        outcome,
    };
    match serde_json::to_string(&entry) {
        Ok(json) => info!(record = %json, "action record"),
        Err(err) => warn!(error = %err, action, "failed to serialize action record"),
    }
}
