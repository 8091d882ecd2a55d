//! Removal of the `<original>.bak` files left behind by `replace`.

use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::config::Config;
use crate::fsops::FileOps;

const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    pub apply: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed: usize,
    pub skipped: usize,
    pub dry_run: usize,
}

impl CleanupStats {
    fn print(&self, out: &mut impl Write) -> Result<()> {
        let total = self.removed + self.skipped + self.dry_run;
        if total == 0 {
            return Ok(());
        }
        writeln!(
            out,
            "cleanup summary: removed={}, skipped={}, dry-run={}",
            self.removed, self.skipped, self.dry_run
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ApprovalDecision {
    Apply,
    Skip,
    ApplyAll,
    Quit,
}

pub fn run_cleanup(
    config: &Config,
    ops: &dyn FileOps,
    options: CleanupOptions,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<CleanupStats> {
    let root = &config.root;
    if !root.is_dir() {
        bail!("cleanup root {} is not a directory", root.display());
    }
    let candidates = find_backup_files(root, config.recursive)?
        .into_iter()
        .filter(|path| !config.is_excluded(path))
        .collect::<Vec<_>>();
    let mut stats = CleanupStats::default();
    if candidates.is_empty() {
        writeln!(out, "no .bak backups found under {}", root.display())?;
        return Ok(stats);
    }

    writeln!(out, "found {} backup file(s):", candidates.len())?;
    for path in &candidates {
        writeln!(out, "  - {}", path.display())?;
    }
    if !options.apply {
        writeln!(out, "dry-run: rerun with --apply to delete these backups.")?;
        stats.dry_run = candidates.len();
        stats.print(out)?;
        return Ok(stats);
    }

    let mut apply_all = options.assume_yes;
    for path in candidates {
        let decision = if apply_all {
            ApprovalDecision::Apply
        } else {
            prompt_approval(&path, input, out)?
        };
        match decision {
            ApprovalDecision::Apply | ApprovalDecision::ApplyAll => {
                if matches!(decision, ApprovalDecision::ApplyAll) {
                    apply_all = true;
                }
                ops.remove(&path)
                    .with_context(|| format!("removing backup {}", path.display()))?;
                crate::logging::record_action("cleanup", &path, "removed");
                writeln!(out, "removed {}", path.display())?;
                stats.removed += 1;
            }
            ApprovalDecision::Skip => {
                writeln!(out, "skipped {}", path.display())?;
                stats.skipped += 1;
            }
            ApprovalDecision::Quit => {
                writeln!(out, "stopping cleanup after user request.")?;
                break;
            }
        }
    }
    stats.print(out)?;
    Ok(stats)
}

/// Backups whose original still sits next to them. A `.bak` without its
/// original is the only copy left and is never offered for removal.
fn find_backup_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !has_hidden_component(root, entry.path()));
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if backup_original(&path).is_some_and(|original| original.exists()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_hidden_component(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .map(|segment| segment.starts_with('.'))
            .unwrap_or(false),
        _ => false,
    })
}

/// `foo.conf.bak` -> `foo.conf`; anything else -> `None`.
fn backup_original(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let base = name.strip_suffix(BACKUP_SUFFIX)?;
    if base.is_empty() {
        return None;
    }
    Some(path.with_file_name(base))
}

fn prompt_approval(
    path: &Path,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<ApprovalDecision> {
    loop {
        write!(
            out,
            "Remove {}? [y]es/[n]o/[a]ll/[q]uit: ",
            path.display()
        )?;
        out.flush()?;
        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(ApprovalDecision::Quit);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(ApprovalDecision::Apply),
            "n" | "no" | "" => return Ok(ApprovalDecision::Skip),
            "a" | "all" => return Ok(ApprovalDecision::ApplyAll),
            "q" | "quit" => return Ok(ApprovalDecision::Quit),
            _ => writeln!(out, "Please enter y, n, a, or q.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::fsops::PrivilegedOps;
    use crate::probe::Capability;
    use std::fs;
    use std::io::Cursor;
    use tempfile::{TempDir, tempdir};

    fn backups_root() -> TempDir {
        let temp = tempdir().expect("temp dir");
        for (name, body) in [
            ("a.conf", "a"),
            ("a.conf.bak", "old a"),
            ("b.conf", "b"),
            ("b.conf.bak", "old b"),
            ("orphan.conf.bak", "only copy"),
            ("c.conf.bak2", "numbered"),
        ] {
            fs::write(temp.path().join(name), body).expect("write fixture");
        }
        temp
    }

    fn run(root: &Path, options: CleanupOptions, answers: &str) -> (CleanupStats, String) {
        let config = test_config(root);
        let ops = PrivilegedOps::new(Capability::Unavailable);
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut out = Vec::new();
        let stats = run_cleanup(&config, &ops, options, &mut input, &mut out).expect("cleanup");
        (stats, String::from_utf8(out).expect("utf-8"))
    }

    #[test]
    fn backup_detector_requires_exact_suffix() {
        assert_eq!(
            backup_original(Path::new("/etc/foo.conf.bak")),
            Some(PathBuf::from("/etc/foo.conf"))
        );
        assert_eq!(backup_original(Path::new("/etc/foo.conf.bak12")), None);
        assert_eq!(backup_original(Path::new("/etc/file.bakup")), None);
        assert_eq!(backup_original(Path::new("/etc/.bak")), None);
    }

    #[test]
    fn dry_run_lists_without_removing() {
        let root = backups_root();
        let (stats, out) = run(root.path(), CleanupOptions::default(), "");

        assert_eq!(stats.dry_run, 2);
        assert!(out.contains("a.conf.bak"));
        assert!(!out.contains("orphan.conf.bak"));
        assert!(!out.contains("c.conf.bak2"));
        assert!(root.path().join("a.conf.bak").exists());
        assert!(root.path().join("b.conf.bak").exists());
    }

    #[test]
    fn prompts_decide_per_file() {
        let root = backups_root();
        let options = CleanupOptions {
            apply: true,
            assume_yes: false,
        };
        let (stats, _) = run(root.path(), options, "y\nn\n");

        assert_eq!(stats.removed, 1);
        assert_eq!(stats.skipped, 1);
        assert!(!root.path().join("a.conf.bak").exists());
        assert!(root.path().join("b.conf.bak").exists());
        assert!(root.path().join("orphan.conf.bak").exists());
    }

    #[test]
    fn quit_stops_before_remaining_files() {
        let root = backups_root();
        let options = CleanupOptions {
            apply: true,
            assume_yes: false,
        };
        let (stats, out) = run(root.path(), options, "q\n");

        assert_eq!(stats, CleanupStats::default());
        assert!(out.contains("stopping cleanup"));
        assert!(root.path().join("a.conf.bak").exists());
    }

    #[test]
    fn assume_yes_removes_every_backup_with_an_original() {
        let root = backups_root();
        let options = CleanupOptions {
            apply: true,
            assume_yes: true,
        };
        let (stats, _) = run(root.path(), options, "");

        assert_eq!(stats.removed, 2);
        assert!(root.path().join("orphan.conf.bak").exists());
        assert_eq!(
            fs::read_to_string(root.path().join("a.conf")).expect("read"),
            "a"
        );
    }
}
