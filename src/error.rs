use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacnewError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("original file {} does not exist", .0.display())]
    MissingOriginal(PathBuf),

    #[error("interrupted")]
    Interrupted,

    #[error("{operation} failed: {detail}")]
    SubprocessFailure { operation: String, detail: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PacnewError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => PacnewError::PathNotFound(path),
            io::ErrorKind::PermissionDenied => PacnewError::PermissionDenied(path),
            _ => PacnewError::Io { path, source },
        }
    }

    pub fn subprocess(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        PacnewError::SubprocessFailure {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

pub type PacnewResult<T> = Result<T, PacnewError>;
