use std::io;
use std::process::{Command, ExitStatus, Output};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{PacnewError, PacnewResult};

static FOREGROUND_CHILD: AtomicBool = AtomicBool::new(false);
static PENDING_SIGNAL: AtomicBool = AtomicBool::new(false);

/// True while an editor or viewer owns the terminal. Signals that arrive in
/// that window belong to the child.
pub fn foreground_child_active() -> bool {
    FOREGROUND_CHILD.load(Ordering::SeqCst)
}

/// Records a termination signal that arrived while a foreground tool was
/// running. The next return from [`run_foreground`] reports it.
pub fn defer_signal() {
    PENDING_SIGNAL.store(true, Ordering::SeqCst);
}

/// Runs an interactive tool and blocks until it exits. A non-zero exit is
/// returned to the caller; a failure to start is an error, and so is a
/// signal deferred while the tool ran.
pub fn run_foreground(mut cmd: Command, operation: &str) -> PacnewResult<ExitStatus> {
    debug!(?cmd, operation, "running foreground tool");
    FOREGROUND_CHILD.store(true, Ordering::SeqCst);
    let status = cmd.status();
    FOREGROUND_CHILD.store(false, Ordering::SeqCst);
    let interrupted = PENDING_SIGNAL.swap(false, Ordering::SeqCst);
    settle(status, interrupted, operation)
}

fn settle(
    status: io::Result<ExitStatus>,
    interrupted: bool,
    operation: &str,
) -> PacnewResult<ExitStatus> {
    if interrupted {
        debug!(operation, "signal arrived while the tool ran");
        return Err(PacnewError::Interrupted);
    }
    status.map_err(|err| PacnewError::subprocess(operation, err.to_string()))
}

/// Runs a helper with captured output and turns a non-zero exit into
/// [`PacnewError::SubprocessFailure`] carrying its stderr.
pub fn run_captured(mut cmd: Command, operation: &str) -> PacnewResult<Output> {
    debug!(?cmd, operation, "running helper");
    let output = cmd
        .output()
        .map_err(|err| PacnewError::subprocess(operation, err.to_string()))?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    };
    Err(PacnewError::subprocess(operation, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_failure_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo nope >&2; exit 3"]);
        let err = run_captured(cmd, "copy a -> b").expect_err("non-zero exit");
        assert_eq!(err.to_string(), "copy a -> b failed: nope");
    }

    #[test]
    fn foreground_returns_child_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 1"]);
        let status = run_foreground(cmd, "diff viewer").expect("spawns");
        assert_eq!(status.code(), Some(1));
    }

    #[test]
    fn deferred_signal_wins_over_child_status() {
        let status = Command::new("true").status();
        let err = settle(status, true, "editor vi").expect_err("interrupted");
        assert!(matches!(err, PacnewError::Interrupted));

        let status = Command::new("true").status();
        let status = settle(status, false, "editor vi").expect("no signal pending");
        assert!(status.success());
    }

    #[test]
    fn missing_program_is_subprocess_failure() {
        let cmd = Command::new("/nonexistent/pacnew-tool");
        let err = run_foreground(cmd, "merge viewer").expect_err("cannot spawn");
        assert!(matches!(err, PacnewError::SubprocessFailure { .. }));
    }
}
