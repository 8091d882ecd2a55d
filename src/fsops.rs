//! Filesystem mutations on files the current user may not own.
//!
//! Every operation is first tried directly; a permission error is retried
//! once through the elevator. Any other failure is returned as-is.

use std::fs::{self, File, Permissions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};
use std::path::{Path, PathBuf};
use std::process;

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{PacnewError, PacnewResult};
use crate::probe::{Capability, Elevation};
use crate::process::run_captured;

pub trait FileOps {
    fn read(&self, path: &Path) -> PacnewResult<Vec<u8>>;

    /// Copies with `cp` semantics: an existing destination keeps its mode and
    /// owner, a new one takes the source's mode.
    fn copy(&self, from: &Path, to: &Path) -> PacnewResult<()>;

    /// Copies and sets an explicit mode on the destination.
    fn install(&self, from: &Path, to: &Path, mode: u32) -> PacnewResult<()>;

    fn remove(&self, path: &Path) -> PacnewResult<()>;
}

#[derive(Debug, Clone)]
pub struct PrivilegedOps {
    elevation: Capability<Elevation>,
}

impl PrivilegedOps {
    pub fn new(elevation: Capability<Elevation>) -> Self {
        Self { elevation }
    }

    fn elevated<T>(
        &self,
        path: &Path,
        err: io::Error,
        op: impl FnOnce(&Elevation) -> PacnewResult<T>,
    ) -> PacnewResult<T> {
        if err.kind() != ErrorKind::PermissionDenied {
            return Err(PacnewError::io(path, err));
        }
        match self.elevation.available() {
            Some(elevation) => {
                debug!(path = %path.display(), "retrying with elevated privileges");
                op(elevation)
            }
            None => Err(PacnewError::PermissionDenied(path.to_path_buf())),
        }
    }
}

impl FileOps for PrivilegedOps {
    fn read(&self, path: &Path) -> PacnewResult<Vec<u8>> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(err) => self.elevated(path, err, |elevation| {
                let mut cmd = elevation.command("cat");
                cmd.arg("--").arg(path);
                let output = run_captured(cmd, &format!("reading {}", path.display()))?;
                Ok(output.stdout)
            }),
        }
    }

    fn copy(&self, from: &Path, to: &Path) -> PacnewResult<()> {
        match copy_direct(from, to) {
            Ok(()) => {
                info!(from = %from.display(), to = %to.display(), "copied");
                Ok(())
            }
            Err(err) => self.elevated(to, err, |elevation| {
                let mut cmd = elevation.command("cp");
                cmd.arg("--").arg(from).arg(to);
                run_captured(
                    cmd,
                    &format!("copying {} to {}", from.display(), to.display()),
                )?;
                info!(from = %from.display(), to = %to.display(), "copied (elevated)");
                Ok(())
            }),
        }
    }

    fn install(&self, from: &Path, to: &Path, mode: u32) -> PacnewResult<()> {
        let result = fs::read(from).and_then(|bytes| {
            write_via_temp(to, &bytes, Permissions::from_mode(mode), None)
        });
        match result {
            Ok(()) => {
                info!(from = %from.display(), to = %to.display(), mode = format!("{mode:o}"), "installed");
                Ok(())
            }
            Err(err) => self.elevated(to, err, |elevation| {
                let mut cmd = elevation.command("install");
                cmd.arg("-m")
                    .arg(format!("{mode:o}"))
                    .arg("--")
                    .arg(from)
                    .arg(to);
                run_captured(
                    cmd,
                    &format!("installing {} to {}", from.display(), to.display()),
                )?;
                Ok(())
            }),
        }
    }

    fn remove(&self, path: &Path) -> PacnewResult<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "removed");
                Ok(())
            }
            Err(err) => self.elevated(path, err, |elevation| {
                let mut cmd = elevation.command("rm");
                cmd.arg("-f").arg("--").arg(path);
                run_captured(cmd, &format!("removing {}", path.display()))?;
                info!(path = %path.display(), "removed (elevated)");
                Ok(())
            }),
        }
    }
}

fn copy_direct(from: &Path, to: &Path) -> io::Result<()> {
    let bytes = fs::read(from)?;
    match fs::metadata(to) {
        Ok(existing) => write_via_temp(
            to,
            &bytes,
            existing.permissions(),
            Some((existing.uid(), existing.gid())),
        ),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let mode = fs::metadata(from)?.permissions();
            write_via_temp(to, &bytes, mode, None)
        }
        Err(err) => Err(err),
    }
}

/// Writes next to the destination and renames over it, so readers never see
/// a half-written file.
fn write_via_temp(
    path: &Path,
    data: &[u8],
    permissions: Permissions,
    owner: Option<(u32, u32)>,
) -> io::Result<()> {
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp_path = temp_sibling(base_dir);
    let written = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::set_permissions(&temp_path, permissions)?;
        if let Some((uid, gid)) = owner {
            chown(&temp_path, Some(uid), Some(gid))?;
        }
        fs::rename(&temp_path, path)
    })();
    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn temp_sibling(dir: &Path) -> PathBuf {
    dir.join(format!(
        ".pacnew-manager-tmp-{}-{}",
        process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    ))
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;

    use super::*;

    /// Wraps [`PrivilegedOps`] and fails copies whose destination matches.
    pub struct FailingOps {
        pub inner: PrivilegedOps,
        pub fail_copy_to_suffix: Option<&'static str>,
        pub fail_remove: bool,
        pub calls: RefCell<Vec<String>>,
    }

    impl FailingOps {
        pub fn new() -> Self {
            Self {
                inner: PrivilegedOps::new(Capability::Unavailable),
                fail_copy_to_suffix: None,
                fail_remove: false,
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn failing_copies_to(suffix: &'static str) -> Self {
            Self {
                fail_copy_to_suffix: Some(suffix),
                ..Self::new()
            }
        }

        fn log(&self, entry: String) {
            self.calls.borrow_mut().push(entry);
        }
    }

    impl FileOps for FailingOps {
        fn read(&self, path: &Path) -> PacnewResult<Vec<u8>> {
            self.inner.read(path)
        }

        fn copy(&self, from: &Path, to: &Path) -> PacnewResult<()> {
            self.log(format!("copy {}", to.display()));
            if let Some(suffix) = self.fail_copy_to_suffix {
                if to.to_string_lossy().ends_with(suffix) {
                    return Err(PacnewError::subprocess(
                        format!("copying {} to {}", from.display(), to.display()),
                        "Read-only file system",
                    ));
                }
            }
            self.inner.copy(from, to)
        }

        fn install(&self, from: &Path, to: &Path, mode: u32) -> PacnewResult<()> {
            self.log(format!("install {}", to.display()));
            self.inner.install(from, to, mode)
        }

        fn remove(&self, path: &Path) -> PacnewResult<()> {
            self.log(format!("remove {}", path.display()));
            if self.fail_remove {
                return Err(PacnewError::subprocess(
                    format!("removing {}", path.display()),
                    "Operation not permitted",
                ));
            }
            self.inner.remove(path)
        }
    }
}
