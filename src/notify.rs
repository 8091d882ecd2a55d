use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::probe::Capability;

const APP_NAME: &str = "pacnew-manager";

/// Best-effort desktop notifications through `notify-send`.
#[derive(Debug, Clone)]
pub struct Notifier {
    program: Capability<PathBuf>,
}

impl Notifier {
    pub fn new(program: Capability<PathBuf>) -> Self {
        Self { program }
    }

    pub fn send(&self, summary: &str, body: &str) {
        let Some(program) = self.program.available() else {
            debug!(summary, "no notifier available");
            return;
        };
        let result = Command::new(program)
            .arg(format!("--app-name={APP_NAME}"))
            .arg(summary)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(%status, "notify-send failed"),
            Err(err) => warn!(error = %err, "notify-send could not start"),
        }
    }
}
