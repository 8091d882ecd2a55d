//! Discovery of `*.pacnew` files below a root directory.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::candidate::{PACNEW_SUFFIX, PacnewCandidate, has_pacnew_suffix};
use crate::config::Config;
use crate::error::{PacnewError, PacnewResult};
use crate::probe::{self, Elevation};
use crate::process::run_captured;

const PATTERN: &str = "*.pacnew";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finder {
    Fd(PathBuf),
    Find(PathBuf),
    Builtin,
}

impl Finder {
    /// Prefers `fd` (packaged as `fdfind` on some distributions), then
    /// `find`, then the in-process walker.
    pub fn probe() -> Self {
        if let Some(fd) = probe::find_executable("fd").or_else(|| probe::find_executable("fdfind"))
        {
            return Finder::Fd(fd);
        }
        if let Some(find) = probe::find_executable("find") {
            return Finder::Find(find);
        }
        Finder::Builtin
    }

    pub fn label(&self) -> &'static str {
        match self {
            Finder::Fd(_) => "fd",
            Finder::Find(_) => "find",
            Finder::Builtin => "builtin",
        }
    }

    /// Program and argument vector for external finders. The elevated retry
    /// reuses exactly this vector behind the elevator.
    fn invocation(&self, root: &Path, recursive: bool) -> Option<(PathBuf, Vec<OsString>)> {
        match self {
            Finder::Fd(program) => {
                let mut args: Vec<OsString> = [
                    "--type",
                    "f",
                    "--hidden",
                    "--no-ignore",
                    "--absolute-path",
                ]
                .into_iter()
                .map(OsString::from)
                .collect();
                if !recursive {
                    args.extend(["--max-depth", "1"].map(OsString::from));
                }
                args.extend(["--glob", PATTERN].map(OsString::from));
                args.push(root.as_os_str().to_os_string());
                Some((program.clone(), args))
            }
            Finder::Find(program) => {
                let mut args = vec![root.as_os_str().to_os_string()];
                if !recursive {
                    args.extend(["-maxdepth", "1"].map(OsString::from));
                }
                args.extend(["-type", "f", "-name", PATTERN].map(OsString::from));
                Some((program.clone(), args))
            }
            Finder::Builtin => None,
        }
    }
}

enum ScanFailure {
    PermissionDenied,
    Failed(PacnewError),
}

pub struct Scanner<'a> {
    config: &'a Config,
}

impl<'a> Scanner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn scan(&self) -> PacnewResult<Vec<PacnewCandidate>> {
        self.scan_root(&self.config.root, self.config.recursive)
    }

    pub fn scan_root(&self, root: &Path, recursive: bool) -> PacnewResult<Vec<PacnewCandidate>> {
        let meta = fs::metadata(root).map_err(|err| PacnewError::io(root, err))?;
        if !meta.is_dir() {
            return Err(PacnewError::InvalidArgument(format!(
                "scan root {} is not a directory",
                root.display()
            )));
        }

        let finder = &self.config.finder;
        debug!(root = %root.display(), recursive, finder = finder.label(), "scanning");
        let found = match finder.invocation(root, recursive) {
            Some((program, args)) => run_finder(&program, &args),
            None => walk(root, recursive),
        };
        let candidates = match found {
            Ok(candidates) => candidates,
            Err(ScanFailure::Failed(err)) => return Err(err),
            Err(ScanFailure::PermissionDenied) => {
                warn!(root = %root.display(), "scan hit unreadable paths; retrying elevated");
                self.scan_elevated(root, recursive)?
            }
        };

        let mut kept: Vec<PacnewCandidate> = candidates
            .into_iter()
            .filter(|candidate| has_pacnew_suffix(&candidate.path))
            .filter(|candidate| !self.config.is_excluded(&candidate.path))
            .collect();
        kept.sort_by(|a, b| a.path.cmp(&b.path));
        kept.dedup_by(|a, b| a.path == b.path);
        debug!(count = kept.len(), "scan finished");
        Ok(kept)
    }

    fn scan_elevated(&self, root: &Path, recursive: bool) -> PacnewResult<Vec<PacnewCandidate>> {
        let denied = || PacnewError::PermissionDenied(root.to_path_buf());
        let elevation = self.config.elevation.available().ok_or_else(denied)?;
        let output = match self.config.finder.invocation(root, recursive) {
            Some((program, args)) => {
                let mut cmd = elevation.command(&program);
                cmd.args(&args);
                run_captured(cmd, "elevated scan").map(|output| {
                    parse_paths(&output.stdout)
                        .into_iter()
                        .map(PacnewCandidate::from_path)
                        .collect()
                })
            }
            None => self_listing(elevation, root, recursive),
        };
        output.map_err(|err| {
            warn!(error = %err, "elevated scan failed");
            denied()
        })
    }
}

fn run_finder(program: &Path, args: &[OsString]) -> Result<Vec<PacnewCandidate>, ScanFailure> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|err| {
            ScanFailure::Failed(PacnewError::subprocess(
                format!("running {}", program.display()),
                err.to_string(),
            ))
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Permission denied") {
            return Err(ScanFailure::PermissionDenied);
        }
        return Err(ScanFailure::Failed(PacnewError::subprocess(
            format!("running {}", program.display()),
            stderr.trim().to_string(),
        )));
    }
    Ok(parse_paths(&output.stdout)
        .into_iter()
        .map(PacnewCandidate::from_path)
        .collect())
}

fn parse_paths(stdout: &[u8]) -> Vec<PathBuf> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn walk(root: &Path, recursive: bool) -> Result<Vec<PacnewCandidate>, ScanFailure> {
    let depth = if recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();
    for entry in WalkDir::new(root).max_depth(depth).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|io| io.kind()) == Some(ErrorKind::PermissionDenied) {
                    return Err(ScanFailure::PermissionDenied);
                }
                let path = err.path().unwrap_or(root).to_path_buf();
                return Err(ScanFailure::Failed(PacnewError::Io {
                    path,
                    source: err.into(),
                }));
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(PACNEW_SUFFIX));
        if matches {
            found.push(PacnewCandidate::from_path(entry.into_path()));
        }
    }
    Ok(found)
}

/// The walker cannot be elevated in-process, so the elevated retry runs this
/// binary's own `list --porcelain` under the elevator.
fn self_listing(
    elevation: &Elevation,
    root: &Path,
    recursive: bool,
) -> PacnewResult<Vec<PacnewCandidate>> {
    let exe = env::current_exe().map_err(|err| PacnewError::io("/proc/self/exe", err))?;
    let mut cmd = elevation.command(exe);
    cmd.arg("--root").arg(root);
    if recursive {
        cmd.arg("--recursive");
    }
    cmd.args(["list", "--porcelain"]);
    let output = run_captured(cmd, "elevated scan")?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(PacnewCandidate::parse_porcelain)
        .collect())
}
