//! User interaction seam.
//!
//! The workflow talks to the user only through [`Dialog`]. Two frontends
//! implement it: `yad` windows for desktop sessions and line prompts on the
//! terminal.

use std::path::{Path, PathBuf};

use time::UtcOffset;

use crate::candidate::{PacnewCandidate, PacnewPair};
use crate::dispatch::{MergeOutcome, ReconciliationAction};
use crate::error::PacnewResult;
use crate::terminal::TerminalDialog;
use crate::yad::YadDialog;

/// What the user did with the candidate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Edit(PathBuf),
    Refresh,
    Close,
}

/// Answer to a yes/no question. `Cancelled` means the window was closed or
/// input ended, which callers treat like a refusal but report differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
    Cancelled,
}

impl Confirmation {
    pub fn is_confirmed(self) -> bool {
        self == Confirmation::Confirmed
    }
}

pub trait Dialog {
    fn select(&mut self, root: &Path, candidates: &[PacnewCandidate]) -> PacnewResult<Selection>;

    fn choose_action(&mut self, pair: &PacnewPair) -> PacnewResult<Option<ReconciliationAction>>;

    fn choose_merge_outcome(&mut self, pair: &PacnewPair) -> PacnewResult<Option<MergeOutcome>>;

    fn confirm(&mut self, question: &str) -> PacnewResult<Confirmation>;

    fn ask_save_path(&mut self, suggested: &Path) -> PacnewResult<Option<PathBuf>>;

    fn info(&mut self, message: &str) -> PacnewResult<()>;

    fn error(&mut self, message: &str) -> PacnewResult<()>;

    fn show_text(&mut self, title: &str, text: &str) -> PacnewResult<()>;

    /// Whether text passed to [`Dialog::show_text`] may carry ANSI colors.
    fn supports_color(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frontend {
    Yad(PathBuf),
    Terminal,
}

impl Frontend {
    pub fn open(self, color: bool, offset: UtcOffset) -> Box<dyn Dialog> {
        match self {
            Frontend::Yad(program) => Box::new(YadDialog::new(program, offset)),
            Frontend::Terminal => Box::new(TerminalDialog::stdio(color, offset)),
        }
    }
}

/// Header line shared by both frontends when asking for an action.
pub fn describe_pair(pair: &PacnewPair) -> String {
    if pair.original_exists {
        format!(
            "{}\noriginal {} exists",
            pair.pacnew.display(),
            pair.original.display()
        )
    } else {
        format!(
            "{}\noriginal {} will be created",
            pair.pacnew.display(),
            pair.original.display()
        )
    }
}
