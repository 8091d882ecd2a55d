use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use time::UtcOffset;
use tracing::debug;

use crate::candidate::{PacnewCandidate, PacnewPair, format_modified, format_size};
use crate::dialog::{Confirmation, Dialog, Selection, describe_pair};
use crate::dispatch::{MergeOutcome, ReconciliationAction};
use crate::error::{PacnewError, PacnewResult};

const TITLE: &str = "Pacnew Manager";
const ICON: &str = "system-software-update";

const EXIT_OK: i32 = 0;
const EXIT_NO: i32 = 1;
const EXIT_REFRESH: i32 = 2;

/// Desktop frontend driving `yad` windows. Button exit codes: 0 primary,
/// 1 secondary, 2 refresh, 252 window closed.
pub struct YadDialog {
    program: PathBuf,
    offset: UtcOffset,
}

struct Reply {
    code: i32,
    stdout: String,
}

impl YadDialog {
    pub fn new(program: PathBuf, offset: UtcOffset) -> Self {
        Self { program, offset }
    }

    fn run(&self, args: &[String], stdin: Option<&str>) -> PacnewResult<Reply> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("--title={TITLE}"))
            .arg(format!("--window-icon={ICON}"))
            .arg("--center")
            .args(args)
            .stdout(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        debug!(?cmd, "opening yad window");
        let failure = |err: std::io::Error| PacnewError::subprocess("yad dialog", err.to_string());
        let mut child = cmd.spawn().map_err(failure)?;
        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes()).map_err(failure)?;
        }
        let output = child.wait_with_output().map_err(failure)?;
        Ok(Reply {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn message(&self, kind: &str, message: &str) -> PacnewResult<()> {
        self.run(
            &[
                kind.to_string(),
                format!("--text={}", escape_markup(message)),
                "--button=OK:0".into(),
            ],
            None,
        )?;
        Ok(())
    }
}

impl Dialog for YadDialog {
    fn select(&mut self, root: &Path, candidates: &[PacnewCandidate]) -> PacnewResult<Selection> {
        let reply = self.run(&list_args(root, candidates, self.offset), None)?;
        Ok(parse_selection(reply.code, &reply.stdout))
    }

    fn choose_action(&mut self, pair: &PacnewPair) -> PacnewResult<Option<ReconciliationAction>> {
        let mut args = vec![
            "--list".to_string(),
            format!("--text={}", escape_markup(&describe_pair(pair))),
            "--width=620".into(),
            "--height=320".into(),
            "--column=Action".into(),
            "--column=Description".into(),
            "--print-column=1".into(),
            "--button=Run:0".into(),
            "--button=Back:1".into(),
        ];
        for action in ReconciliationAction::ALL {
            args.push(action.label().into());
            args.push(action.description(pair.original_exists).into());
        }
        let reply = self.run(&args, None)?;
        if reply.code != EXIT_OK {
            return Ok(None);
        }
        Ok(ReconciliationAction::parse(first_field(&reply.stdout)))
    }

    fn choose_merge_outcome(&mut self, pair: &PacnewPair) -> PacnewResult<Option<MergeOutcome>> {
        let mut args = vec![
            "--list".to_string(),
            format!(
                "--text=Merge finished for {}",
                escape_markup(&pair.original.display().to_string())
            ),
            "--width=560".into(),
            "--height=260".into(),
            "--column=Result".into(),
            "--column=Description".into(),
            "--print-column=1".into(),
            "--button=OK:0".into(),
        ];
        for outcome in MergeOutcome::ALL {
            args.push(outcome.label().into());
            args.push(outcome.description().into());
        }
        let reply = self.run(&args, None)?;
        if reply.code != EXIT_OK {
            return Ok(None);
        }
        Ok(MergeOutcome::parse(first_field(&reply.stdout)))
    }

    fn confirm(&mut self, question: &str) -> PacnewResult<Confirmation> {
        let reply = self.run(
            &[
                "--question".into(),
                format!("--text={}", escape_markup(question)),
                "--button=Yes:0".into(),
                "--button=No:1".into(),
            ],
            None,
        )?;
        Ok(confirmation_from_code(reply.code))
    }

    fn ask_save_path(&mut self, suggested: &Path) -> PacnewResult<Option<PathBuf>> {
        let reply = self.run(
            &[
                "--file".into(),
                "--save".into(),
                "--confirm-overwrite".into(),
                format!("--filename={}", suggested.display()),
            ],
            None,
        )?;
        let chosen = reply.stdout.trim();
        if reply.code != EXIT_OK || chosen.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(chosen)))
    }

    fn info(&mut self, message: &str) -> PacnewResult<()> {
        self.message("--info", message)
    }

    fn error(&mut self, message: &str) -> PacnewResult<()> {
        self.message("--error", message)
    }

    fn show_text(&mut self, title: &str, text: &str) -> PacnewResult<()> {
        self.run(
            &[
                "--text-info".into(),
                format!("--text={}", escape_markup(title)),
                "--fontname=monospace".into(),
                "--width=900".into(),
                "--height=700".into(),
                "--button=Close:0".into(),
            ],
            Some(text),
        )?;
        Ok(())
    }
}

fn list_args(root: &Path, candidates: &[PacnewCandidate], offset: UtcOffset) -> Vec<String> {
    let mut args = vec![
        "--list".to_string(),
        format!(
            "--text={} pacnew file(s) under {}",
            candidates.len(),
            escape_markup(&root.display().to_string())
        ),
        "--width=900".into(),
        "--height=480".into(),
        "--column=#:NUM".into(),
        "--column=Path".into(),
        "--column=Size".into(),
        "--column=Modified".into(),
        "--print-column=2".into(),
        "--button=Edit:0".into(),
        format!("--button=Refresh:{EXIT_REFRESH}"),
        "--button=Close:1".into(),
    ];
    for (idx, candidate) in candidates.iter().enumerate() {
        args.push((idx + 1).to_string());
        args.push(candidate.path.display().to_string());
        args.push(
            candidate
                .size
                .map(format_size)
                .unwrap_or_else(|| "?".into()),
        );
        args.push(format_modified(candidate.modified, offset));
    }
    args
}

/// Pressing Edit without a highlighted row just redraws the table.
fn parse_selection(code: i32, stdout: &str) -> Selection {
    match code {
        EXIT_OK => {
            let path = first_field(stdout);
            if path.is_empty() {
                Selection::Refresh
            } else {
                Selection::Edit(PathBuf::from(path))
            }
        }
        EXIT_REFRESH => Selection::Refresh,
        _ => Selection::Close,
    }
}

fn confirmation_from_code(code: i32) -> Confirmation {
    match code {
        EXIT_OK => Confirmation::Confirmed,
        EXIT_NO => Confirmation::Declined,
        _ => Confirmation::Cancelled,
    }
}

/// yad prints the selected row as `value|`.
fn first_field(stdout: &str) -> &str {
    stdout
        .lines()
        .next()
        .unwrap_or("")
        .split('|')
        .next()
        .unwrap_or("")
        .trim()
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
