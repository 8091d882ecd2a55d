//! Capability probes for external collaborators.
//!
//! Every probe runs once while the configuration is built; components receive
//! the resulting [`Capability`] and never look at `PATH` themselves.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(inner) => Capability::Available(inner),
            None => Capability::Unavailable,
        }
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Capability::Available(inner) => Some(inner),
            Capability::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }
}

pub fn find_executable(name: &str) -> Option<PathBuf> {
    let found = find_in_path(name, env::var_os("PATH").as_deref());
    debug!(tool = name, found = ?found, "probed executable");
    found
}

pub fn find_in_path(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }
    env::split_paths(path_var?)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Runs commands with elevated privileges through `sudo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elevation {
    program: PathBuf,
}

impl Elevation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Root needs no elevator; everyone else needs `sudo` on `PATH`.
    pub fn probe() -> Capability<Elevation> {
        if running_as_root() {
            return Capability::Unavailable;
        }
        Capability::from_option(find_executable("sudo").map(Elevation::new))
    }

    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(program);
        cmd
    }
}
