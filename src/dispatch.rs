//! Reconciliation of one pacnew/original pair.
//!
//! The dispatcher walks `Idle -> FileSelected -> ActionChosen -> Executing`
//! and back to `FileSelected` for as long as the pacnew file exists. Closing
//! the action menu, or an action that consumes the pacnew, ends in `Done`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::candidate::{PacnewPair, backup_path};
use crate::config::{Config, ToolCommand};
use crate::diff::{DEFAULT_CONTEXT, render_unified};
use crate::dialog::Dialog;
use crate::edit::{EditOutcome, SafeEditor};
use crate::error::{PacnewError, PacnewResult};
use crate::fsops::FileOps;
use crate::logging::record_action;
use crate::notify::Notifier;
use crate::process::run_foreground;
use crate::workspace::{MaterializedPair, Workspace};

const SAVE_AS_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationAction {
    ViewEdit,
    Diff,
    Merge,
    Replace,
    Delete,
}

impl ReconciliationAction {
    pub const ALL: [ReconciliationAction; 5] = [
        ReconciliationAction::ViewEdit,
        ReconciliationAction::Diff,
        ReconciliationAction::Merge,
        ReconciliationAction::Replace,
        ReconciliationAction::Delete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReconciliationAction::ViewEdit => "view-edit",
            ReconciliationAction::Diff => "diff",
            ReconciliationAction::Merge => "merge",
            ReconciliationAction::Replace => "replace",
            ReconciliationAction::Delete => "delete",
        }
    }

    pub fn key(self) -> char {
        match self {
            ReconciliationAction::ViewEdit => 'e',
            ReconciliationAction::Diff => 'd',
            ReconciliationAction::Merge => 'm',
            ReconciliationAction::Replace => 'r',
            ReconciliationAction::Delete => 'x',
        }
    }

    /// The wording changes with the original's presence; the set does not.
    pub fn description(self, original_exists: bool) -> &'static str {
        match (self, original_exists) {
            (ReconciliationAction::ViewEdit, _) => "View and edit the .pacnew file",
            (ReconciliationAction::Diff, true) => "Compare the original with the .pacnew file",
            (ReconciliationAction::Diff, false) => "Compare (unavailable: no original yet)",
            (ReconciliationAction::Merge, true) => "Merge the .pacnew file into the original",
            (ReconciliationAction::Merge, false) => "Merge (unavailable: no original yet)",
            (ReconciliationAction::Replace, true) => "Replace the original, keeping a .bak backup",
            (ReconciliationAction::Replace, false) => "Install the .pacnew file as the original",
            (ReconciliationAction::Delete, _) => "Delete the .pacnew file",
        }
    }

    /// Accepts the label, the one-letter key, or the 1-based menu position.
    pub fn parse(answer: &str) -> Option<Self> {
        let answer = answer.trim();
        Self::ALL.into_iter().enumerate().find_map(|(idx, action)| {
            let matches = answer == action.label()
                || answer.chars().eq(std::iter::once(action.key()))
                || answer == (idx + 1).to_string();
            matches.then_some(action)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    ApplyToOriginal,
    ApplyToPacnew,
    SaveAsNew,
    Discard,
}

impl MergeOutcome {
    pub const ALL: [MergeOutcome; 4] = [
        MergeOutcome::ApplyToOriginal,
        MergeOutcome::ApplyToPacnew,
        MergeOutcome::SaveAsNew,
        MergeOutcome::Discard,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MergeOutcome::ApplyToOriginal => "apply-to-original",
            MergeOutcome::ApplyToPacnew => "apply-to-pacnew",
            MergeOutcome::SaveAsNew => "save-as-new",
            MergeOutcome::Discard => "discard",
        }
    }

    pub fn key(self) -> char {
        match self {
            MergeOutcome::ApplyToOriginal => 'o',
            MergeOutcome::ApplyToPacnew => 'p',
            MergeOutcome::SaveAsNew => 's',
            MergeOutcome::Discard => 'd',
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MergeOutcome::ApplyToOriginal => "Write the merged result over the original",
            MergeOutcome::ApplyToPacnew => "Write the merged result over the .pacnew file",
            MergeOutcome::SaveAsNew => "Save the merged result to a new file",
            MergeOutcome::Discard => "Discard the merge",
        }
    }

    pub fn parse(answer: &str) -> Option<Self> {
        let answer = answer.trim();
        Self::ALL.into_iter().enumerate().find_map(|(idx, outcome)| {
            let matches = answer == outcome.label()
                || answer.chars().eq(std::iter::once(outcome.key()))
                || answer == (idx + 1).to_string();
            matches.then_some(outcome)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DispatchState {
    Idle,
    FileSelected(PacnewPair),
    ActionChosen(PacnewPair, ReconciliationAction),
    Executing(PacnewPair, ReconciliationAction),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Cancelled,
    Failed,
}

impl ActionOutcome {
    fn label(self) -> &'static str {
        match self {
            ActionOutcome::Completed => "completed",
            ActionOutcome::Cancelled => "cancelled",
            ActionOutcome::Failed => "failed",
        }
    }
}

pub struct Dispatcher<'a> {
    config: &'a Config,
    editor: &'a ToolCommand,
    ops: &'a dyn FileOps,
    workspace: &'a Workspace,
    notifier: &'a Notifier,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        config: &'a Config,
        editor: &'a ToolCommand,
        ops: &'a dyn FileOps,
        workspace: &'a Workspace,
        notifier: &'a Notifier,
    ) -> Self {
        Self {
            config,
            editor,
            ops,
            workspace,
            notifier,
        }
    }

    pub fn run(&self, pacnew: &Path, dialog: &mut dyn Dialog) -> PacnewResult<()> {
        let mut state = DispatchState::Idle;
        loop {
            state = match state {
                DispatchState::Idle => DispatchState::FileSelected(PacnewPair::new(pacnew)),
                DispatchState::FileSelected(pair) => match dialog.choose_action(&pair)? {
                    Some(action) => DispatchState::ActionChosen(pair, action),
                    None => DispatchState::Done,
                },
                DispatchState::ActionChosen(pair, action) => {
                    debug!(action = action.label(), pacnew = %pair.pacnew.display(), "action chosen");
                    DispatchState::Executing(pair, action)
                }
                DispatchState::Executing(pair, action) => {
                    let outcome = self.execute(&pair, action, dialog)?;
                    record_action(action.label(), &pair.pacnew, outcome.label());
                    if pair.pacnew_exists() {
                        DispatchState::FileSelected(pair.refreshed())
                    } else {
                        DispatchState::Done
                    }
                }
                DispatchState::Done => return Ok(()),
            };
        }
    }

    /// Failures end the action, never the session: they are reported and
    /// the user is returned to the action menu.
    fn execute(
        &self,
        pair: &PacnewPair,
        action: ReconciliationAction,
        dialog: &mut dyn Dialog,
    ) -> PacnewResult<ActionOutcome> {
        let result = match action {
            ReconciliationAction::ViewEdit => self.view_edit(pair, dialog),
            ReconciliationAction::Diff => self.diff(pair, dialog),
            ReconciliationAction::Merge => self.merge(pair, dialog),
            ReconciliationAction::Replace => self.replace(pair, dialog),
            ReconciliationAction::Delete => self.delete(pair, dialog),
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(PacnewError::Interrupted) => Err(PacnewError::Interrupted),
            Err(PacnewError::MissingOriginal(original)) => {
                dialog.error(&format!(
                    "Cannot {}: original {} does not exist",
                    action.label(),
                    original.display()
                ))?;
                Ok(ActionOutcome::Failed)
            }
            Err(err) => {
                dialog.error(&format!("{} failed: {err}", action.label()))?;
                Ok(ActionOutcome::Failed)
            }
        }
    }

    fn view_edit(&self, pair: &PacnewPair, dialog: &mut dyn Dialog) -> PacnewResult<ActionOutcome> {
        let editor = SafeEditor::new(&self.config.edit_strategy, self.editor, self.ops, self.workspace);
        Ok(match editor.edit(&pair.pacnew, dialog)? {
            EditOutcome::Applied => {
                self.succeeded(dialog, &format!("Saved {}", pair.pacnew.display()))?;
                ActionOutcome::Completed
            }
            EditOutcome::Delegated => {
                dialog.info(&format!("Edited {} via sudoedit", pair.pacnew.display()))?;
                ActionOutcome::Completed
            }
            EditOutcome::Unchanged => ActionOutcome::Completed,
            EditOutcome::Discarded => ActionOutcome::Cancelled,
        })
    }

    fn diff(&self, pair: &PacnewPair, dialog: &mut dyn Dialog) -> PacnewResult<ActionOutcome> {
        let copies = self.materialize(pair)?;
        match self.config.diff_tool.available() {
            Some(tool) => {
                let status = run_foreground(
                    tool.command(&[copies.original.as_path(), copies.pacnew.as_path()]),
                    &format!("diff viewer {tool}"),
                )?;
                // diff(1) and friends exit 1 when the inputs differ.
                debug!(%status, "diff viewer exited");
            }
            None => {
                let old = read_lossy(&copies.original)?;
                let new = read_lossy(&copies.pacnew)?;
                let text = render_unified(
                    &pair.original.display().to_string(),
                    &pair.pacnew.display().to_string(),
                    &old,
                    &new,
                    DEFAULT_CONTEXT,
                    dialog.supports_color(),
                );
                if text.is_empty() {
                    dialog.info(&format!("{} and its .pacnew are identical", pair.original.display()))?;
                } else {
                    dialog.show_text(&format!("diff {}", pair.file_name()), &text)?;
                }
            }
        }
        Ok(ActionOutcome::Completed)
    }

    /// The merged result is the workspace copy of the original, i.e. the
    /// left-hand side of the merge viewer.
    fn merge(&self, pair: &PacnewPair, dialog: &mut dyn Dialog) -> PacnewResult<ActionOutcome> {
        let copies = self.materialize(pair)?;
        let tool = self.config.merge_tool.available().ok_or_else(|| {
            PacnewError::MissingDependency(
                "no merge tool found; set PACNEW_MERGETOOL or pass --merge-tool".into(),
            )
        })?;
        let status = run_foreground(
            tool.command(&[copies.original.as_path(), copies.pacnew.as_path()]),
            &format!("merge viewer {tool}"),
        )?;
        debug!(%status, "merge viewer exited");

        let Some(outcome) = dialog.choose_merge_outcome(pair)? else {
            dialog.info("Merge discarded")?;
            return Ok(ActionOutcome::Cancelled);
        };
        let merged = &copies.original;
        match outcome {
            MergeOutcome::ApplyToOriginal => {
                self.ops
                    .copy(merged, &pair.original)
                    .map_err(|err| staged(format!("writing {}", pair.original.display()), err))?;
                self.succeeded(dialog, &format!("Merged result written to {}", pair.original.display()))?;
            }
            MergeOutcome::ApplyToPacnew => {
                self.ops
                    .copy(merged, &pair.pacnew)
                    .map_err(|err| staged(format!("writing {}", pair.pacnew.display()), err))?;
                self.succeeded(dialog, &format!("Merged result written to {}", pair.pacnew.display()))?;
            }
            MergeOutcome::SaveAsNew => {
                let suggested = suffixed(&pair.original, ".merged");
                let Some(dest) = dialog.ask_save_path(&suggested)? else {
                    dialog.info("Merge not saved")?;
                    return Ok(ActionOutcome::Cancelled);
                };
                self.ops
                    .install(merged, &dest, SAVE_AS_MODE)
                    .map_err(|err| staged(format!("saving {}", dest.display()), err))?;
                self.succeeded(dialog, &format!("Merged result saved as {}", dest.display()))?;
            }
            MergeOutcome::Discard => {
                dialog.info("Merge discarded")?;
                return Ok(ActionOutcome::Cancelled);
            }
        }
        Ok(ActionOutcome::Completed)
    }

    /// Backup, then overwrite, then remove. Each step runs only if the one
    /// before it succeeded, so the original is never lost.
    fn replace(&self, pair: &PacnewPair, dialog: &mut dyn Dialog) -> PacnewResult<ActionOutcome> {
        if !pair.original_exists {
            return self.install(pair, dialog);
        }
        let backup = backup_path(&pair.original);
        let question = format!(
            "Replace {} with {}?\nThe current file will be saved as {}.",
            pair.original.display(),
            pair.pacnew.display(),
            backup.display()
        );
        if !dialog.confirm(&question)?.is_confirmed() {
            return Ok(ActionOutcome::Cancelled);
        }

        self.ops
            .copy(&pair.original, &backup)
            .map_err(|err| staged(format!("backup of {}", pair.original.display()), err))?;
        record_action("backup", &backup, "written");
        self.ops
            .copy(&pair.pacnew, &pair.original)
            .map_err(|err| staged(format!("overwriting {}", pair.original.display()), err))?;
        self.ops
            .remove(&pair.pacnew)
            .map_err(|err| staged(format!("removing {}", pair.pacnew.display()), err))?;

        self.succeeded(
            dialog,
            &format!(
                "Replaced {} (backup: {})",
                pair.original.display(),
                backup.display()
            ),
        )?;
        Ok(ActionOutcome::Completed)
    }

    fn install(&self, pair: &PacnewPair, dialog: &mut dyn Dialog) -> PacnewResult<ActionOutcome> {
        let question = format!(
            "{} does not exist. Install {} in its place?",
            pair.original.display(),
            pair.pacnew.display()
        );
        if !dialog.confirm(&question)?.is_confirmed() {
            return Ok(ActionOutcome::Cancelled);
        }
        self.ops
            .copy(&pair.pacnew, &pair.original)
            .map_err(|err| staged(format!("installing {}", pair.original.display()), err))?;
        self.ops
            .remove(&pair.pacnew)
            .map_err(|err| staged(format!("removing {}", pair.pacnew.display()), err))?;
        self.succeeded(dialog, &format!("Installed {}", pair.original.display()))?;
        Ok(ActionOutcome::Completed)
    }

    fn delete(&self, pair: &PacnewPair, dialog: &mut dyn Dialog) -> PacnewResult<ActionOutcome> {
        let question = format!("Delete {}?", pair.pacnew.display());
        if !dialog.confirm(&question)?.is_confirmed() {
            return Ok(ActionOutcome::Cancelled);
        }
        self.ops
            .remove(&pair.pacnew)
            .map_err(|err| staged(format!("removing {}", pair.pacnew.display()), err))?;
        self.succeeded(dialog, &format!("Deleted {}", pair.pacnew.display()))?;
        Ok(ActionOutcome::Completed)
    }

    fn materialize(&self, pair: &PacnewPair) -> PacnewResult<MaterializedPair> {
        if !pair.original.exists() {
            return Err(PacnewError::MissingOriginal(pair.original.clone()));
        }
        self.workspace.materialize_pair(self.ops, pair)
    }

    fn succeeded(&self, dialog: &mut dyn Dialog, message: &str) -> PacnewResult<()> {
        self.notifier.send("pacnew-manager", message);
        dialog.info(message)
    }
}

/// Names the step that failed while keeping the underlying cause.
fn staged(operation: String, err: PacnewError) -> PacnewError {
    match err {
        PacnewError::Interrupted => err,
        err => PacnewError::subprocess(operation, err.to_string()),
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn read_lossy(path: &Path) -> PacnewResult<String> {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|err| PacnewError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::edit::EditStrategy;
    use crate::fsops::PrivilegedOps;
    use crate::fsops::testing::FailingOps;
    use crate::probe::Capability;
    use crate::terminal::testing::{ScriptedDialog, scripted, transcript};
    use crate::workspace::modified_time;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        etc: TempDir,
        config: Config,
        workspace: Workspace,
        notifier: Notifier,
        editor: ToolCommand,
    }

    impl Fixture {
        fn new() -> Self {
            let etc = tempdir().expect("temp dir");
            let config = test_config(etc.path());
            Self {
                etc,
                config,
                workspace: Workspace::create().expect("workspace"),
                notifier: Notifier::new(Capability::Unavailable),
                editor: ToolCommand::new("true", &[]),
            }
        }

        fn file(&self, name: &str, body: &str) -> PathBuf {
            let path = self.etc.path().join(name);
            fs::write(&path, body).expect("write fixture");
            fs::File::options()
                .write(true)
                .open(&path)
                .and_then(|file| file.set_modified(aged()))
                .expect("age fixture");
            path
        }

        fn run(&self, ops: &dyn FileOps, pacnew: &Path, answers: &[&str]) -> String {
            let mut dialog: ScriptedDialog = scripted(answers);
            Dispatcher::new(&self.config, &self.editor, ops, &self.workspace, &self.notifier)
                .run(pacnew, &mut dialog)
                .expect("dispatch");
            transcript(dialog)
        }
    }

    fn aged() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_600_000_000)
    }

    fn direct() -> PrivilegedOps {
        PrivilegedOps::new(Capability::Unavailable)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).expect("read")
    }

    #[test]
    fn parse_accepts_label_key_and_index() {
        assert_eq!(ReconciliationAction::parse("replace"), Some(ReconciliationAction::Replace));
        assert_eq!(ReconciliationAction::parse("x"), Some(ReconciliationAction::Delete));
        assert_eq!(ReconciliationAction::parse("1"), Some(ReconciliationAction::ViewEdit));
        assert_eq!(ReconciliationAction::parse("6"), None);
        assert_eq!(MergeOutcome::parse("save-as-new"), Some(MergeOutcome::SaveAsNew));
        assert_eq!(MergeOutcome::parse("4"), Some(MergeOutcome::Discard));
    }

    #[test]
    fn replace_backs_up_then_overwrites() {
        let fx = Fixture::new();
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        let out = fx.run(&direct(), &pacnew, &["replace", "y"]);

        assert_eq!(read(&original), "new\n");
        assert!(!pacnew.exists());
        assert_eq!(read(&fx.etc.path().join("a.conf.bak")), "old\n");
        assert!(out.contains("Replaced"));
    }

    #[test]
    fn failed_backup_leaves_everything_in_place() {
        let fx = Fixture::new();
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");
        let ops = FailingOps::failing_copies_to(".bak");

        let out = fx.run(&ops, &pacnew, &["replace", "y", "b"]);

        assert_eq!(read(&original), "old\n");
        assert_eq!(modified_time(&original).expect("mtime"), aged());
        assert!(pacnew.exists());
        assert!(!fx.etc.path().join("a.conf.bak").exists());
        assert_eq!(ops.calls.borrow().len(), 1);
        assert!(out.contains("replace failed: backup of"));
    }

    #[test]
    fn failed_overwrite_keeps_backup_and_original() {
        let fx = Fixture::new();
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");
        let ops = FailingOps::failing_copies_to("a.conf");

        let out = fx.run(&ops, &pacnew, &["replace", "y", "b"]);

        assert_eq!(read(&original), "old\n");
        assert_eq!(modified_time(&original).expect("mtime"), aged());
        assert_eq!(read(&fx.etc.path().join("a.conf.bak")), "old\n");
        assert!(pacnew.exists());
        assert!(out.contains("replace failed: overwriting"));
        assert!(!ops.calls.borrow().iter().any(|call| call.starts_with("remove")));
    }

    #[test]
    fn merge_without_original_reports_missing_original_first() {
        let mut fx = Fixture::new();
        fx.config.merge_tool = Capability::Unavailable;
        let pacnew = fx.file("n.conf.pacnew", "new\n");

        let out = fx.run(&direct(), &pacnew, &["merge", "b"]);

        assert!(out.contains("Cannot merge: original"));
        assert!(!out.contains("missing dependency"));
        assert!(pacnew.exists());
    }

    #[test]
    fn merge_without_tool_is_reported() {
        let mut fx = Fixture::new();
        fx.config.merge_tool = Capability::Unavailable;
        fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        let out = fx.run(&direct(), &pacnew, &["merge", "b"]);

        assert!(out.contains("merge failed: missing dependency"));
        assert_eq!(read(&pacnew), "new\n");
    }

    #[test]
    fn failed_removal_is_reported() {
        let fx = Fixture::new();
        fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");
        let mut ops = FailingOps::new();
        ops.fail_remove = true;

        let out = fx.run(&ops, &pacnew, &["delete", "y", "b"]);

        assert!(pacnew.exists());
        assert!(out.contains("delete failed: removing"));
    }

    #[test]
    fn declined_replace_changes_nothing() {
        let fx = Fixture::new();
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        fx.run(&direct(), &pacnew, &["replace", "n", "b"]);

        assert_eq!(read(&original), "old\n");
        assert!(pacnew.exists());
        assert!(!fx.etc.path().join("a.conf.bak").exists());
    }

    #[test]
    fn replace_without_original_installs() {
        let fx = Fixture::new();
        let pacnew = fx.file("new.conf.pacnew", "fresh\n");

        let out = fx.run(&direct(), &pacnew, &["replace", "y"]);

        assert_eq!(read(&fx.etc.path().join("new.conf")), "fresh\n");
        assert!(!pacnew.exists());
        assert!(!fx.etc.path().join("new.conf.bak").exists());
        assert!(out.contains("will be created"));
        assert!(out.contains("Installed"));
    }

    #[test]
    fn delete_keeps_original_untouched() {
        let fx = Fixture::new();
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        fx.run(&direct(), &pacnew, &["delete", "y"]);

        assert!(!pacnew.exists());
        assert_eq!(read(&original), "old\n");
        assert_eq!(modified_time(&original).expect("mtime"), aged());
    }

    #[test]
    fn diff_without_original_aborts_only_the_action() {
        let fx = Fixture::new();
        let pacnew = fx.file("b.conf.pacnew", "new\n");

        let out = fx.run(&direct(), &pacnew, &["diff", "merge", "b"]);

        assert!(out.contains("Cannot diff: original"));
        assert!(out.contains("Cannot merge: original"));
        assert!(pacnew.exists());
    }

    #[test]
    fn builtin_diff_is_shown_without_viewer() {
        let fx = Fixture::new();
        fx.file("a.conf", "keep\nold\n");
        let pacnew = fx.file("a.conf.pacnew", "keep\nnew\n");

        let out = fx.run(&direct(), &pacnew, &["diff", "b"]);

        assert!(out.contains("-old\n"));
        assert!(out.contains("+new\n"));
        assert!(fx.workspace.path().join("a.conf").exists());
        assert!(fx.workspace.path().join("a.conf.pacnew").exists());
    }

    #[test]
    fn merge_then_discard_mutates_nothing() {
        let mut fx = Fixture::new();
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");
        fx.config.merge_tool =
            Capability::Available(ToolCommand::new("sh", &["-c", "echo merged > \"$0\""]));

        fx.run(&direct(), &pacnew, &["merge", "discard", "b"]);

        assert_eq!(read(&original), "old\n");
        assert_eq!(read(&pacnew), "new\n");
        assert_eq!(modified_time(&original).expect("mtime"), aged());
        assert_eq!(modified_time(&pacnew).expect("mtime"), aged());
        assert_eq!(read(&fx.workspace.path().join("a.conf")), "merged\n");
    }

    #[test]
    fn merge_applies_result_to_original() {
        let mut fx = Fixture::new();
        fx.config.merge_tool =
            Capability::Available(ToolCommand::new("sh", &["-c", "echo merged > \"$0\""]));
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        fx.run(&direct(), &pacnew, &["merge", "apply-to-original", "b"]);

        assert_eq!(read(&original), "merged\n");
        assert_eq!(read(&pacnew), "new\n");
    }

    #[test]
    fn merge_applies_result_to_pacnew() {
        let mut fx = Fixture::new();
        fx.config.merge_tool =
            Capability::Available(ToolCommand::new("sh", &["-c", "echo merged > \"$0\""]));
        let original = fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        fx.run(&direct(), &pacnew, &["merge", "p", "b"]);

        assert_eq!(read(&original), "old\n");
        assert_eq!(read(&pacnew), "merged\n");
    }

    #[test]
    fn merge_saves_as_new_file_with_standard_mode() {
        let fx = Fixture::new();
        fx.file("a.conf", "old\n");
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        fx.run(&direct(), &pacnew, &["merge", "save-as-new", "", "b"]);

        let saved = fx.etc.path().join("a.conf.merged");
        assert_eq!(read(&saved), "old\n");
        let mode = fs::metadata(&saved).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn view_edit_without_changes_keeps_pacnew() {
        let fx = Fixture::new();
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        let out = fx.run(&direct(), &pacnew, &["view-edit", "b"]);

        assert_eq!(read(&pacnew), "new\n");
        assert!(out.contains("No changes"));
    }

    #[test]
    fn closing_the_menu_ends_dispatch() {
        let fx = Fixture::new();
        let pacnew = fx.file("a.conf.pacnew", "new\n");
        let out = fx.run(&direct(), &pacnew, &[]);
        assert!(out.contains("Action [1-5]"));
        assert!(pacnew.exists());
    }

    #[test]
    fn sudoedit_session_is_reported() {
        let mut fx = Fixture::new();
        fx.config.edit_strategy = EditStrategy::SudoEdit(PathBuf::from("true"));
        let pacnew = fx.file("a.conf.pacnew", "new\n");

        let out = fx.run(&direct(), &pacnew, &["view-edit", "b"]);

        assert!(out.contains("via sudoedit"));
        assert!(!out.contains("No changes"));
        assert_eq!(read(&pacnew), "new\n");
    }

    /// Behaves like a signal delivered while the removal helper ran.
    struct InterruptedRemoval(PrivilegedOps);

    impl FileOps for InterruptedRemoval {
        fn read(&self, path: &Path) -> PacnewResult<Vec<u8>> {
            self.0.read(path)
        }

        fn copy(&self, from: &Path, to: &Path) -> PacnewResult<()> {
            self.0.copy(from, to)
        }

        fn install(&self, from: &Path, to: &Path, mode: u32) -> PacnewResult<()> {
            self.0.install(from, to, mode)
        }

        fn remove(&self, _path: &Path) -> PacnewResult<()> {
            Err(PacnewError::Interrupted)
        }
    }

    #[test]
    fn interruption_ends_dispatch_instead_of_reporting() {
        let fx = Fixture::new();
        let pacnew = fx.file("a.conf.pacnew", "new\n");
        let ops = InterruptedRemoval(direct());
        let mut dialog: ScriptedDialog = scripted(&["delete", "y", "b"]);

        let result = Dispatcher::new(&fx.config, &fx.editor, &ops, &fx.workspace, &fx.notifier)
            .run(&pacnew, &mut dialog);

        assert!(matches!(result, Err(PacnewError::Interrupted)));
        assert!(!transcript(dialog).contains("delete failed"));
        assert!(pacnew.exists());
    }
}
