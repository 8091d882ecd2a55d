use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use time::{OffsetDateTime, UtcOffset, macros::format_description};

pub const PACNEW_SUFFIX: &str = ".pacnew";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacnewCandidate {
    pub path: PathBuf,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

impl PacnewCandidate {
    /// Builds a candidate, leaving size and mtime empty when the file cannot
    /// be stat'ed by the current user.
    pub fn from_path(path: PathBuf) -> Self {
        match fs::metadata(&path) {
            Ok(meta) => Self {
                size: Some(meta.len()),
                modified: meta.modified().ok(),
                path,
            },
            Err(_) => Self {
                path,
                size: None,
                modified: None,
            },
        }
    }

    pub fn original(&self) -> PathBuf {
        original_path(&self.path)
    }

    /// One line of `list --porcelain`: `size<TAB>mtime<TAB>path`.
    pub fn to_porcelain(&self) -> String {
        let size = self
            .size
            .map(|len| len.to_string())
            .unwrap_or_else(|| "-".into());
        let modified = self
            .modified
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs().to_string())
            .unwrap_or_else(|| "-".into());
        format!("{size}\t{modified}\t{}", self.path.display())
    }

    pub fn parse_porcelain(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, '\t');
        let size = parts.next()?;
        let modified = parts.next()?;
        let path = parts.next()?;
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: PathBuf::from(path),
            size: size.parse().ok(),
            modified: modified
                .parse()
                .ok()
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
        })
    }
}

pub fn has_pacnew_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > PACNEW_SUFFIX.len() && name.ends_with(PACNEW_SUFFIX))
}

/// The live file a pacnew proposes to replace. Paths without the suffix come
/// back unchanged, so applying this twice is the same as applying it once.
pub fn original_path(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    match raw.strip_suffix(PACNEW_SUFFIX) {
        Some(stripped) if has_pacnew_suffix(path) => PathBuf::from(stripped),
        _ => path.to_path_buf(),
    }
}

pub fn backup_path(original: &Path) -> PathBuf {
    let mut raw = original.as_os_str().to_os_string();
    raw.push(".bak");
    PathBuf::from(raw)
}

/// A pacnew file together with the original it shadows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacnewPair {
    pub pacnew: PathBuf,
    pub original: PathBuf,
    pub original_exists: bool,
}

impl PacnewPair {
    pub fn new(pacnew: impl Into<PathBuf>) -> Self {
        let pacnew = pacnew.into();
        let original = original_path(&pacnew);
        let original_exists = original.exists();
        Self {
            pacnew,
            original,
            original_exists,
        }
    }

    pub fn refreshed(&self) -> Self {
        Self::new(self.pacnew.clone())
    }

    pub fn pacnew_exists(&self) -> bool {
        self.pacnew.exists()
    }

    pub fn file_name(&self) -> String {
        self.original
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".into())
    }
}

pub fn format_size(len: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if len < 1024 {
        return format!("{len} B");
    }
    let mut value = len as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub fn format_modified(modified: Option<SystemTime>, offset: UtcOffset) -> String {
    let Some(time) = modified else {
        return "?".into();
    };
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    OffsetDateTime::from(time)
        .to_offset(offset)
        .format(&format)
        .unwrap_or_else(|_| "?".into())
}
