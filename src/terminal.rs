use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::path::{Path, PathBuf};

use owo_colors::{OwoColorize, Style};
use time::UtcOffset;

use crate::candidate::{PacnewCandidate, PacnewPair, format_modified, format_size};
use crate::dialog::{Confirmation, Dialog, Selection, describe_pair};
use crate::dispatch::{MergeOutcome, ReconciliationAction};
use crate::error::{PacnewError, PacnewResult};

/// Line-prompt frontend. Generic over its streams so flows can be driven
/// from scripted input.
pub struct TerminalDialog<R, W> {
    input: R,
    output: W,
    color: bool,
    offset: UtcOffset,
}

impl TerminalDialog<StdinLock<'static>, Stdout> {
    pub fn stdio(color: bool, offset: UtcOffset) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), color, offset)
    }
}

impl<R: BufRead, W: Write> TerminalDialog<R, W> {
    pub fn new(input: R, output: W, color: bool, offset: UtcOffset) -> Self {
        Self {
            input,
            output,
            color,
            offset,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    fn say(&mut self, line: &str) -> PacnewResult<()> {
        writeln!(self.output, "{line}").map_err(terminal_error)
    }

    /// `None` once input is exhausted.
    fn prompt(&mut self, message: &str) -> PacnewResult<Option<String>> {
        let styled = self.paint(message, Style::new().bold());
        write!(self.output, "{styled}").map_err(terminal_error)?;
        self.output.flush().map_err(terminal_error)?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(terminal_error)?;
        if read == 0 {
            self.say("").ok();
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn render_table(&mut self, root: &Path, candidates: &[PacnewCandidate]) -> PacnewResult<()> {
        let header = format!("{} pacnew file(s) under {}", candidates.len(), root.display());
        let header = self.paint(&header, Style::new().bold().cyan());
        self.say(&header)?;
        let width = candidates
            .iter()
            .map(|c| c.path.display().to_string().len())
            .max()
            .unwrap_or(4)
            .max(4);
        self.say(&format!(
            "{:>3}  {:<width$}  {:>10}  {}",
            "#", "Path", "Size", "Modified"
        ))?;
        for (idx, candidate) in candidates.iter().enumerate() {
            let size = candidate
                .size
                .map(format_size)
                .unwrap_or_else(|| "?".into());
            let modified = format_modified(candidate.modified, self.offset);
            self.say(&format!(
                "{:>3}  {:<width$}  {:>10}  {}",
                idx + 1,
                candidate.path.display(),
                size,
                modified
            ))?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Dialog for TerminalDialog<R, W> {
    fn select(&mut self, root: &Path, candidates: &[PacnewCandidate]) -> PacnewResult<Selection> {
        self.render_table(root, candidates)?;
        loop {
            let Some(answer) = self.prompt(&format!(
                "Select [1-{}], [r]efresh, [q]uit: ",
                candidates.len()
            ))?
            else {
                return Ok(Selection::Close);
            };
            match answer.to_lowercase().as_str() {
                "r" | "refresh" => return Ok(Selection::Refresh),
                "q" | "quit" | "close" => return Ok(Selection::Close),
                other => match other.parse::<usize>() {
                    Ok(n) if (1..=candidates.len()).contains(&n) => {
                        return Ok(Selection::Edit(candidates[n - 1].path.clone()));
                    }
                    _ => self.say("Please enter a row number, r, or q.")?,
                },
            }
        }
    }

    fn choose_action(&mut self, pair: &PacnewPair) -> PacnewResult<Option<ReconciliationAction>> {
        self.say("")?;
        for line in describe_pair(pair).lines() {
            self.say(line)?;
        }
        for (idx, action) in ReconciliationAction::ALL.iter().enumerate() {
            self.say(&format!(
                "  {}) [{}] {:<10} {}",
                idx + 1,
                action.key(),
                action.label(),
                action.description(pair.original_exists)
            ))?;
        }
        loop {
            let Some(answer) = self.prompt("Action [1-5], [b]ack: ")? else {
                return Ok(None);
            };
            let answer = answer.to_lowercase();
            if matches!(answer.as_str(), "b" | "back" | "q" | "") {
                return Ok(None);
            }
            match ReconciliationAction::parse(&answer) {
                Some(action) => return Ok(Some(action)),
                None => self.say("Unknown action.")?,
            }
        }
    }

    fn choose_merge_outcome(&mut self, pair: &PacnewPair) -> PacnewResult<Option<MergeOutcome>> {
        self.say(&format!("Merge finished for {}", pair.original.display()))?;
        for (idx, outcome) in MergeOutcome::ALL.iter().enumerate() {
            self.say(&format!(
                "  {}) [{}] {}",
                idx + 1,
                outcome.key(),
                outcome.description()
            ))?;
        }
        loop {
            let Some(answer) = self.prompt("Merge result [1-4]: ")? else {
                return Ok(None);
            };
            match MergeOutcome::parse(&answer.to_lowercase()) {
                Some(outcome) => return Ok(Some(outcome)),
                None => self.say("Please choose 1-4.")?,
            }
        }
    }

    fn confirm(&mut self, question: &str) -> PacnewResult<Confirmation> {
        loop {
            let Some(answer) = self.prompt(&format!("{question} [y]es/[n]o/[c]ancel: "))? else {
                return Ok(Confirmation::Cancelled);
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(Confirmation::Confirmed),
                "n" | "no" | "" => return Ok(Confirmation::Declined),
                "c" | "cancel" => return Ok(Confirmation::Cancelled),
                _ => self.say("Please enter y, n, or c.")?,
            }
        }
    }

    fn ask_save_path(&mut self, suggested: &Path) -> PacnewResult<Option<PathBuf>> {
        let answer = self.prompt(&format!(
            "Save merged file as [{}] (- to cancel): ",
            suggested.display()
        ))?;
        Ok(match answer.as_deref() {
            None | Some("-") => None,
            Some("") => Some(suggested.to_path_buf()),
            Some(path) => Some(PathBuf::from(path)),
        })
    }

    fn info(&mut self, message: &str) -> PacnewResult<()> {
        let line = self.paint(message, Style::new().green());
        self.say(&line)
    }

    fn error(&mut self, message: &str) -> PacnewResult<()> {
        let line = self.paint(&format!("error: {message}"), Style::new().red().bold());
        self.say(&line)
    }

    fn show_text(&mut self, title: &str, text: &str) -> PacnewResult<()> {
        let title = self.paint(&format!("--- {title} ---"), Style::new().bold());
        self.say(&title)?;
        write!(self.output, "{text}").map_err(terminal_error)?;
        if !text.ends_with('\n') {
            self.say("")?;
        }
        Ok(())
    }

    fn supports_color(&self) -> bool {
        self.color
    }
}

fn terminal_error(err: io::Error) -> PacnewError {
    PacnewError::io("/dev/tty", err)
}
