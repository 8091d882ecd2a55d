//! Editing of files the user may not own without risking the live copy.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ToolCommand;
use crate::dialog::{Confirmation, Dialog};
use crate::error::{PacnewError, PacnewResult};
use crate::fsops::FileOps;
use crate::probe::{self, running_as_root};
use crate::process::run_foreground;
use crate::workspace::{Workspace, modified_time};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStrategy {
    /// `sudoedit` already edits a private copy and replaces atomically.
    SudoEdit(PathBuf),
    CopyEdit,
}

impl EditStrategy {
    pub fn probe() -> Self {
        if running_as_root() {
            return EditStrategy::CopyEdit;
        }
        match probe::find_executable("sudoedit") {
            Some(helper) => EditStrategy::SudoEdit(helper),
            None => EditStrategy::CopyEdit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Unchanged,
    Discarded,
    Delegated,
}

pub struct SafeEditor<'a> {
    strategy: &'a EditStrategy,
    editor: &'a ToolCommand,
    ops: &'a dyn FileOps,
    workspace: &'a Workspace,
}

impl<'a> SafeEditor<'a> {
    pub fn new(
        strategy: &'a EditStrategy,
        editor: &'a ToolCommand,
        ops: &'a dyn FileOps,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            strategy,
            editor,
            ops,
            workspace,
        }
    }

    pub fn edit(&self, target: &Path, dialog: &mut dyn Dialog) -> PacnewResult<EditOutcome> {
        match self.strategy {
            EditStrategy::SudoEdit(helper) => self.delegate(helper, target),
            EditStrategy::CopyEdit => self.copy_edit(target, dialog),
        }
    }

    fn delegate(&self, helper: &Path, target: &Path) -> PacnewResult<EditOutcome> {
        let mut cmd = std::process::Command::new(helper);
        cmd.env("SUDO_EDITOR", self.editor.to_string()).arg(target);
        let status = run_foreground(cmd, &format!("sudoedit {}", target.display()))?;
        if !status.success() {
            return Err(PacnewError::subprocess(
                format!("sudoedit {}", target.display()),
                format!("exited with {status}"),
            ));
        }
        Ok(EditOutcome::Delegated)
    }

    fn copy_edit(&self, target: &Path, dialog: &mut dyn Dialog) -> PacnewResult<EditOutcome> {
        let scratch = self.workspace.scratch_copy(self.ops, target)?;
        let before = modified_time(&scratch)?;
        let status = run_foreground(
            self.editor.command(&[scratch.as_path()]),
            &format!("editor {}", self.editor),
        )?;
        debug!(%status, "editor exited");
        let after = modified_time(&scratch)?;

        // Editors do not report "quit without saving" through their exit code.
        if before == after {
            dialog.info(&format!("No changes to {}", target.display()))?;
            return Ok(EditOutcome::Unchanged);
        }

        let question = format!("Save your changes to {}?", target.display());
        match dialog.confirm(&question)? {
            Confirmation::Confirmed => {
                self.ops.copy(&scratch, target)?;
                info!(path = %target.display(), "applied edited copy");
                Ok(EditOutcome::Applied)
            }
            Confirmation::Declined | Confirmation::Cancelled => {
                dialog.info(&format!("Changes to {} discarded", target.display()))?;
                Ok(EditOutcome::Discarded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::PrivilegedOps;
    use crate::probe::Capability;
    use crate::terminal::testing::{scripted, transcript};
    use std::fs;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    fn aged_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write");
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(UNIX_EPOCH + Duration::from_secs(1_500_000_000)))
            .expect("age file");
        path
    }

    fn appending_editor() -> ToolCommand {
        ToolCommand::new("sh", &["-c", "echo edited >> \"$0\""])
    }

    #[test]
    fn unchanged_copy_leaves_source_identical() {
        let etc = tempdir().expect("temp dir");
        let target = aged_file(etc.path(), "locale.gen.pacnew", "en_US.UTF-8 UTF-8\n");
        let before = fs::read(&target).expect("read");
        let before_mtime = modified_time(&target).expect("mtime");
        let workspace = Workspace::create().expect("workspace");
        let ops = PrivilegedOps::new(Capability::Unavailable);
        let editor = ToolCommand::new("true", &[]);
        let strategy = EditStrategy::CopyEdit;
        let mut dialog = scripted(&[]);

        let outcome = SafeEditor::new(&strategy, &editor, &ops, &workspace)
            .edit(&target, &mut dialog)
            .expect("edit");

        assert_eq!(outcome, EditOutcome::Unchanged);
        assert_eq!(fs::read(&target).expect("read"), before);
        assert_eq!(modified_time(&target).expect("mtime"), before_mtime);
        assert!(transcript(dialog).contains("No changes"));
    }

    #[test]
    fn confirmed_edit_is_applied() {
        let etc = tempdir().expect("temp dir");
        let target = aged_file(etc.path(), "hosts.pacnew", "127.0.0.1 localhost\n");
        let workspace = Workspace::create().expect("workspace");
        let ops = PrivilegedOps::new(Capability::Unavailable);
        let editor = appending_editor();
        let strategy = EditStrategy::CopyEdit;
        let mut dialog = scripted(&["y"]);

        let outcome = SafeEditor::new(&strategy, &editor, &ops, &workspace)
            .edit(&target, &mut dialog)
            .expect("edit");

        assert_eq!(outcome, EditOutcome::Applied);
        assert_eq!(
            fs::read_to_string(&target).expect("read"),
            "127.0.0.1 localhost\nedited\n"
        );
    }

    #[test]
    fn declined_edit_leaves_source_alone() {
        let etc = tempdir().expect("temp dir");
        let target = aged_file(etc.path(), "hosts.pacnew", "127.0.0.1 localhost\n");
        let workspace = Workspace::create().expect("workspace");
        let ops = PrivilegedOps::new(Capability::Unavailable);
        let editor = appending_editor();
        let strategy = EditStrategy::CopyEdit;
        let mut dialog = scripted(&["n"]);

        let outcome = SafeEditor::new(&strategy, &editor, &ops, &workspace)
            .edit(&target, &mut dialog)
            .expect("edit");

        assert_eq!(outcome, EditOutcome::Discarded);
        assert_eq!(
            fs::read_to_string(&target).expect("read"),
            "127.0.0.1 localhost\n"
        );
    }
}
