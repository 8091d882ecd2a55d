use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};

mod candidate;
mod cleanup;
mod config;
mod dialog;
mod diff;
mod dispatch;
mod edit;
mod error;
mod fsops;
mod logging;
mod notify;
mod probe;
mod process;
mod scan;
mod selector;
mod terminal;
mod workspace;
mod yad;

use candidate::{PacnewCandidate, format_modified, format_size};
use cleanup::{CleanupOptions, run_cleanup};
use config::{ColorChoice, Config, DEFAULT_ROOT, FrontendChoice, Settings};
use dispatch::Dispatcher;
use edit::{EditOutcome, SafeEditor};
use error::PacnewError;
use fsops::PrivilegedOps;
use notify::Notifier;
use scan::Scanner;
use selector::{Selector, Workflow};
use workspace::Workspace;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.global.debug);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if was_interrupted(&err) => {
            eprintln!("interrupted");
            ExitCode::from(130)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Handlers have already dropped their workspace by the time this is seen.
fn was_interrupted(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<PacnewError>(),
            Some(PacnewError::Interrupted)
        )
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env(cli.global.settings()).context("loading configuration")?;
    debug!(
        root = %config.root.display(),
        finder = config.finder.label(),
        elevation = config.elevation.is_available(),
        "configuration resolved"
    );
    match cli.command.unwrap_or(Command::Manage) {
        Command::Manage => handle_manage(&config),
        Command::List(cmd) => handle_list(&config, cmd),
        Command::Edit(cmd) => handle_edit(&config, cmd),
        Command::Cleanup(cmd) => handle_cleanup(&config, cmd),
    }
}

fn handle_manage(config: &Config) -> Result<()> {
    let editor = config.editor()?;
    let workspace = Workspace::create()?;
    workspace.remove_on_signal()?;
    let ops = PrivilegedOps::new(config.elevation.clone());
    let notifier = Notifier::new(config.notifier.clone());
    let frontend = config.resolve_frontend();
    info!(?frontend, workspace = %workspace.path().display(), "starting reconciliation");

    let mut dialog = frontend.open(config.color, config.utc_offset);
    let workflow = Workflow::new(
        Selector::new(Scanner::new(config)),
        Dispatcher::new(config, editor, &ops, &workspace, &notifier),
    );
    workflow.run(dialog.as_mut())?;
    Ok(())
}

fn handle_list(config: &Config, cmd: ListCommand) -> Result<()> {
    let candidates = Scanner::new(config)
        .scan()
        .with_context(|| format!("scanning {}", config.root.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    print_list(&mut out, config, &candidates, &cmd)?;
    out.flush()?;
    Ok(())
}

fn handle_edit(config: &Config, cmd: EditCommand) -> Result<()> {
    let target = &cmd.path;
    fs::metadata(target).map_err(|err| PacnewError::io(target, err))?;
    let editor = config.editor()?;
    let workspace = Workspace::create()?;
    workspace.remove_on_signal()?;
    let ops = PrivilegedOps::new(config.elevation.clone());
    let mut dialog = config
        .resolve_frontend()
        .open(config.color, config.utc_offset);

    let outcome = SafeEditor::new(&config.edit_strategy, editor, &ops, &workspace)
        .edit(target, dialog.as_mut())
        .with_context(|| format!("editing {}", target.display()))?;
    logging::record_action("edit", target, edit_outcome_label(outcome));
    if outcome == EditOutcome::Applied {
        dialog.info(&format!("Saved {}", target.display()))?;
    }
    Ok(())
}

fn handle_cleanup(config: &Config, cmd: CleanupCommand) -> Result<()> {
    let ops = PrivilegedOps::new(config.elevation.clone());
    let options = CleanupOptions {
        apply: cmd.apply,
        assume_yes: cmd.auto_apply,
    };
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_cleanup(config, &ops, options, &mut stdin.lock(), &mut stdout.lock())?;
    Ok(())
}

fn edit_outcome_label(outcome: EditOutcome) -> &'static str {
    match outcome {
        EditOutcome::Applied => "applied",
        EditOutcome::Unchanged => "unchanged",
        EditOutcome::Discarded => "discarded",
        EditOutcome::Delegated => "delegated",
    }
}

#[derive(Debug, Serialize)]
struct ListRow {
    index: usize,
    path: PathBuf,
    original: PathBuf,
    original_exists: bool,
    size: Option<u64>,
    modified: Option<String>,
}

fn list_rows(candidates: &[PacnewCandidate]) -> Vec<ListRow> {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let original = candidate.original();
            ListRow {
                index: idx + 1,
                path: candidate.path.clone(),
                original_exists: original.exists(),
                original,
                size: candidate.size,
                modified: candidate
                    .modified
                    .map(OffsetDateTime::from)
                    .and_then(|stamp| stamp.format(&Rfc3339).ok()),
            }
        })
        .collect()
}

fn print_list(
    out: &mut impl Write,
    config: &Config,
    candidates: &[PacnewCandidate],
    cmd: &ListCommand,
) -> Result<()> {
    if cmd.porcelain {
        for candidate in candidates {
            writeln!(out, "{}", candidate.to_porcelain())?;
        }
        return Ok(());
    }
    if cmd.json {
        let rows = list_rows(candidates);
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }
    if candidates.is_empty() {
        writeln!(out, "no .pacnew files found under {}", config.root.display())?;
        return Ok(());
    }

    let header = format!(
        "{} pacnew file(s) under {}",
        candidates.len(),
        config.root.display()
    );
    if config.color {
        writeln!(out, "{}", header.bold())?;
    } else {
        writeln!(out, "{header}")?;
    }
    for (idx, candidate) in candidates.iter().enumerate() {
        let size = candidate
            .size
            .map(format_size)
            .unwrap_or_else(|| "?".into());
        let marker = if candidate.original().exists() {
            ""
        } else {
            "  (new)"
        };
        writeln!(
            out,
            "{:>3}  {}  {:>10}  {}{marker}",
            idx + 1,
            candidate.path.display(),
            size,
            format_modified(candidate.modified, config.utc_offset)
        )?;
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "pacnew-manager",
    version,
    about = "Review and reconcile pacman .pacnew files"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive reconciliation workflow (default)
    Manage,
    /// Print the .pacnew files found under the root
    List(ListCommand),
    /// Edit one file through a private copy
    Edit(EditCommand),
    /// Remove <original>.bak backups left by replace
    Cleanup(CleanupCommand),
}

#[derive(Debug, Clone, Args)]
struct GlobalArgs {
    /// Directory to scan
    #[arg(short = 'p', long = "root", value_name = "DIR", default_value = DEFAULT_ROOT, global = true, value_hint = ValueHint::DirPath)]
    root: PathBuf,
    /// Descend into subdirectories
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    recursive: bool,
    /// Editor command
    #[arg(short, long, value_name = "CMD", global = true)]
    editor: Option<String>,
    /// Merge viewer command
    #[arg(short = 'm', long = "merge-tool", value_name = "CMD", global = true)]
    merge_tool: Option<String>,
    /// Diff viewer command
    #[arg(long = "diff-tool", value_name = "CMD", global = true)]
    diff_tool: Option<String>,
    /// Skip candidates matching GLOB (repeatable)
    #[arg(long = "exclude", value_name = "GLOB", global = true)]
    exclude: Vec<String>,
    #[arg(long, value_enum, default_value = "auto", global = true)]
    frontend: FrontendChoice,
    #[arg(long, value_enum, global = true)]
    color: Option<ColorChoice>,
    /// Verbose logging on stderr
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    debug: bool,
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        Settings {
            root: Some(self.root.clone()),
            recursive: self.recursive,
            editor: self.editor.clone(),
            diff_tool: self.diff_tool.clone(),
            merge_tool: self.merge_tool.clone(),
            exclude: self.exclude.clone(),
            frontend: self.frontend,
            color: self.color,
        }
    }
}

#[derive(Debug, Args)]
struct ListCommand {
    /// JSON array instead of a table
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "porcelain")]
    json: bool,
    /// Tab-separated `size mtime path` lines
    #[arg(long, action = ArgAction::SetTrue)]
    porcelain: bool,
}

#[derive(Debug, Args)]
struct EditCommand {
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    path: PathBuf,
}

#[derive(Debug, Args)]
struct CleanupCommand {
    /// Remove backups instead of listing them
    #[arg(long, action = ArgAction::SetTrue)]
    apply: bool,
    /// Do not prompt for each backup
    #[arg(long = "yes", action = ArgAction::SetTrue)]
    auto_apply: bool,
}

#[cfg(test)]
fn list_output(config: &Config, candidates: &[PacnewCandidate], cmd: &ListCommand) -> String {
    let mut out = Vec::new();
    print_list(&mut out, config, candidates, cmd).expect("print list");
    String::from_utf8(out).expect("utf-8")
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn interruption_is_found_under_context() {
        let err = anyhow::Error::from(PacnewError::Interrupted).context("editing /etc/a.conf");
        assert!(was_interrupted(&err));
        let err = anyhow::Error::from(PacnewError::MissingDependency("vi".into()));
        assert!(!was_interrupted(&err));
    }

    #[test]
    fn manage_is_the_default_command() {
        let cli = Cli::try_parse_from(["pacnew-manager"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.global.root, PathBuf::from("/etc"));
        assert!(!cli.global.recursive);
        assert_eq!(cli.global.frontend, FrontendChoice::Auto);
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "pacnew-manager",
            "list",
            "--porcelain",
            "-p",
            "/srv/etc",
            "-r",
            "--exclude",
            "*/pacman.d/*",
            "--exclude",
            "*.orig.pacnew",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::List(ListCommand {
                porcelain: true,
                json: false
            }))
        ));
        assert_eq!(cli.global.root, PathBuf::from("/srv/etc"));
        assert!(cli.global.recursive);
        assert_eq!(cli.global.exclude.len(), 2);
    }

    #[test]
    fn elevated_listing_invocation_parses() {
        let cli = Cli::try_parse_from([
            "pacnew-manager",
            "--root",
            "/etc",
            "--recursive",
            "list",
            "--porcelain",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Some(Command::List(_))));
        assert!(cli.global.recursive);
    }

    #[test]
    fn json_and_porcelain_conflict() {
        assert!(Cli::try_parse_from(["pacnew-manager", "list", "--json", "--porcelain"]).is_err());
    }

    #[test]
    fn tool_overrides_and_frontend() {
        let cli = Cli::try_parse_from([
            "pacnew-manager",
            "-e",
            "nano -w",
            "-m",
            "meld",
            "--diff-tool",
            "diff -u",
            "--frontend",
            "terminal",
            "--color",
            "never",
            "edit",
            "/etc/hosts",
        ])
        .expect("parse");
        let settings = cli.global.settings();
        assert_eq!(settings.editor.as_deref(), Some("nano -w"));
        assert_eq!(settings.merge_tool.as_deref(), Some("meld"));
        assert_eq!(settings.diff_tool.as_deref(), Some("diff -u"));
        assert_eq!(settings.frontend, FrontendChoice::Terminal);
        assert_eq!(settings.color, Some(ColorChoice::Never));
        assert!(matches!(cli.command, Some(Command::Edit(EditCommand { ref path })) if path == Path::new("/etc/hosts")));
    }

    #[test]
    fn cleanup_flags() {
        let cli = Cli::try_parse_from(["pacnew-manager", "cleanup", "--apply", "--yes"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Command::Cleanup(CleanupCommand {
                apply: true,
                auto_apply: true
            }))
        ));
    }
}
