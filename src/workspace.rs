use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::{Builder, TempDir};
use tracing::debug;

use crate::candidate::PacnewPair;
use crate::error::{PacnewError, PacnewResult};
use crate::fsops::FileOps;
use crate::process::{defer_signal, foreground_child_active};

const PREFIX: &str = "pacnew-manager-";
const PRIVATE_MODE: u32 = 0o600;

/// Process-private scratch directory, removed when dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

/// Workspace copies of a pair, under names that stay the same for the whole
/// run so viewers show `<name>` and `<name>.pacnew`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedPair {
    pub original: PathBuf,
    pub pacnew: PathBuf,
}

impl Workspace {
    pub fn create() -> PacnewResult<Self> {
        let dir = Builder::new()
            .prefix(PREFIX)
            .tempdir()
            .map_err(|err| PacnewError::io(std::env::temp_dir(), err))?;
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the workspace and exits 130 on interrupt or termination. While
    /// a foreground tool runs the signal is deferred until it exits, and the
    /// caller unwinds with [`PacnewError::Interrupted`]. Must be called at
    /// most once per process.
    pub fn remove_on_signal(&self) -> PacnewResult<()> {
        let path = self.path().to_path_buf();
        ctrlc::set_handler(move || {
            if foreground_child_active() {
                defer_signal();
                return;
            }
            let _ = fs::remove_dir_all(&path);
            std::process::exit(130);
        })
        .map_err(|err| PacnewError::subprocess("installing signal handler", err.to_string()))
    }

    pub fn materialize_pair(
        &self,
        ops: &dyn FileOps,
        pair: &PacnewPair,
    ) -> PacnewResult<MaterializedPair> {
        let name = pair.file_name();
        let original = self.write_copy(ops, &pair.original, &name)?;
        let pacnew = self.write_copy(ops, &pair.pacnew, &format!("{name}.pacnew"))?;
        Ok(MaterializedPair { original, pacnew })
    }

    /// Private, owner-writable copy of `source` for the safe editor. The copy
    /// carries the source's mtime so an untouched copy is recognisable.
    pub fn scratch_copy(&self, ops: &dyn FileOps, source: &Path) -> PacnewResult<PathBuf> {
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let scratch = self.write_copy(ops, source, &format!("edit-{name}"))?;
        if let Ok(modified) = fs::metadata(source).and_then(|meta| meta.modified()) {
            set_modified(&scratch, modified)?;
        }
        Ok(scratch)
    }

    fn write_copy(&self, ops: &dyn FileOps, source: &Path, name: &str) -> PacnewResult<PathBuf> {
        let bytes = ops.read(source)?;
        let dest = self.path().join(name);
        fs::write(&dest, bytes).map_err(|err| PacnewError::io(&dest, err))?;
        fs::set_permissions(&dest, Permissions::from_mode(PRIVATE_MODE))
            .map_err(|err| PacnewError::io(&dest, err))?;
        debug!(source = %source.display(), copy = %dest.display(), "materialized");
        Ok(dest)
    }
}

pub fn modified_time(path: &Path) -> PacnewResult<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| PacnewError::io(path, err))
}

fn set_modified(path: &Path, time: SystemTime) -> PacnewResult<()> {
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(time))
        .map_err(|err| PacnewError::io(path, err))
}
