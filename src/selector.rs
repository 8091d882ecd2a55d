use std::path::PathBuf;

use tracing::debug;

use crate::dialog::{Dialog, Selection};
use crate::dispatch::Dispatcher;
use crate::error::PacnewResult;
use crate::scan::Scanner;

/// Presents the candidate table until the user picks a file or leaves.
pub struct Selector<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Selector<'a> {
    pub fn new(scanner: Scanner<'a>) -> Self {
        Self { scanner }
    }

    /// `None` when nothing was found or the table was closed.
    pub fn choose(&self, dialog: &mut dyn Dialog) -> PacnewResult<Option<PathBuf>> {
        let root = self.scanner.root();
        loop {
            let candidates = match self.scanner.scan() {
                Ok(candidates) => candidates,
                Err(err) => {
                    dialog.error(&format!("Scanning {} failed: {err}", root.display()))?;
                    return Err(err);
                }
            };
            if candidates.is_empty() {
                dialog.info(&format!("No .pacnew files found under {}", root.display()))?;
                return Ok(None);
            }
            match dialog.select(root, &candidates)? {
                Selection::Edit(path) => return Ok(Some(path)),
                Selection::Refresh => debug!("refreshing candidate list"),
                Selection::Close => return Ok(None),
            }
        }
    }
}

/// Select, reconcile, rescan, until there is nothing left or the user quits.
pub struct Workflow<'a> {
    selector: Selector<'a>,
    dispatcher: Dispatcher<'a>,
}

impl<'a> Workflow<'a> {
    pub fn new(selector: Selector<'a>, dispatcher: Dispatcher<'a>) -> Self {
        Self {
            selector,
            dispatcher,
        }
    }

    pub fn run(&self, dialog: &mut dyn Dialog) -> PacnewResult<()> {
        while let Some(pacnew) = self.selector.choose(dialog)? {
            self.dispatcher.run(&pacnew, dialog)?;
        }
        Ok(())
    }
}
