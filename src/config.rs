//! Startup configuration.
//!
//! Everything the workflow needs to know about its environment is resolved
//! here exactly once: command line overrides, environment variables and the
//! capability probes. The resulting [`Config`] is immutable and handed to
//! every component by reference.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::ValueEnum;
use globset::{Glob, GlobSet, GlobSetBuilder};
use is_terminal::IsTerminal;
use time::UtcOffset;

use crate::dialog::Frontend;
use crate::edit::EditStrategy;
use crate::error::{PacnewError, PacnewResult};
use crate::probe::{self, Capability, Elevation};
use crate::scan::Finder;

pub const DEFAULT_ROOT: &str = "/etc";
pub const DEFAULT_EDITOR: &str = "vi";
pub const DEFAULT_DIFF_TOOL: &str = "vimdiff";
pub const DEFAULT_MERGE_TOOL: &str = "vimdiff";

const EDITOR_ENV: &[&str] = &["PACNEW_EDITOR", "VISUAL", "EDITOR"];
const DIFF_ENV: &[&str] = &["PACNEW_DIFFTOOL", "DIFFPROG"];
const MERGE_ENV: &[&str] = &["PACNEW_MERGETOOL", "MERGEPROG"];

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(ColorChoice::Auto),
            "always" | "1" | "yes" => Some(ColorChoice::Always),
            "never" | "0" | "no" => Some(ColorChoice::Never),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Default)]
pub enum FrontendChoice {
    #[default]
    Auto,
    Yad,
    Terminal,
}

/// An external program plus the arguments that precede the file operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// Splits values such as `code --wait` on whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut words = raw.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn command(&self, files: &[&Path]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(files);
        cmd
    }

    pub fn is_installed(&self) -> bool {
        probe::find_executable(&self.program).is_some()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Raw user input, before probing.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub root: Option<PathBuf>,
    pub recursive: bool,
    pub editor: Option<String>,
    pub diff_tool: Option<String>,
    pub merge_tool: Option<String>,
    pub exclude: Vec<String>,
    pub frontend: FrontendChoice,
    pub color: Option<ColorChoice>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub recursive: bool,
    pub excludes: Option<GlobSet>,
    pub editor: Capability<ToolCommand>,
    pub diff_tool: Capability<ToolCommand>,
    pub merge_tool: Capability<ToolCommand>,
    pub color: bool,
    pub utc_offset: UtcOffset,
    pub frontend: FrontendChoice,
    pub yad: Capability<PathBuf>,
    pub has_display: bool,
    pub finder: Finder,
    pub elevation: Capability<Elevation>,
    pub edit_strategy: EditStrategy,
    pub notifier: Capability<PathBuf>,
}

impl Config {
    pub fn from_env(settings: Settings) -> PacnewResult<Self> {
        Self::build(settings, &|key| std::env::var(key).ok())
    }

    pub fn build(settings: Settings, env: &dyn Fn(&str) -> Option<String>) -> PacnewResult<Self> {
        let root = settings
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
        if root.exists() && !root.is_dir() {
            return Err(PacnewError::InvalidArgument(format!(
                "scan root {} is not a directory",
                root.display()
            )));
        }
        // Candidates inherit the root's form; finders print paths relative
        // to whatever they were given.
        let root = if root.exists() {
            fs::canonicalize(&root).map_err(|err| PacnewError::io(&root, err))?
        } else {
            root
        };

        let excludes = build_excludes(&settings.exclude)?;
        let editor = resolve_tool(settings.editor.as_deref(), EDITOR_ENV, env, DEFAULT_EDITOR);
        let diff_tool = resolve_tool(settings.diff_tool.as_deref(), DIFF_ENV, env, DEFAULT_DIFF_TOOL);
        let merge_tool =
            resolve_tool(settings.merge_tool.as_deref(), MERGE_ENV, env, DEFAULT_MERGE_TOOL);
        let elevation = Elevation::probe();
        let has_display = env("DISPLAY").is_some() || env("WAYLAND_DISPLAY").is_some();

        let yad = Capability::from_option(probe::find_executable("yad"));
        if settings.frontend == FrontendChoice::Yad && !yad.is_available() {
            return Err(PacnewError::MissingDependency(
                "yad is required for --frontend yad".into(),
            ));
        }

        Ok(Self {
            root,
            recursive: settings.recursive,
            excludes,
            editor: installed(editor),
            diff_tool: installed(diff_tool),
            merge_tool: installed(merge_tool),
            color: resolve_color(settings.color, env).should_color(),
            utc_offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            frontend: settings.frontend,
            yad,
            has_display,
            finder: Finder::probe(),
            edit_strategy: EditStrategy::probe(),
            notifier: Capability::from_option(probe::find_executable("notify-send")),
            elevation,
        })
    }

    /// The editor is only needed by interactive commands, so its absence is
    /// reported when one of them starts rather than at parse time.
    pub fn editor(&self) -> PacnewResult<&ToolCommand> {
        self.editor.available().ok_or_else(|| {
            PacnewError::MissingDependency(
                "no editor found; set PACNEW_EDITOR, VISUAL or EDITOR, or pass --editor".into(),
            )
        })
    }

    pub fn resolve_frontend(&self) -> Frontend {
        match (self.frontend, self.yad.available()) {
            (FrontendChoice::Terminal, _) | (_, None) => Frontend::Terminal,
            (FrontendChoice::Yad, Some(yad)) => Frontend::Yad(yad.clone()),
            (FrontendChoice::Auto, Some(yad)) if self.has_display => Frontend::Yad(yad.clone()),
            (FrontendChoice::Auto, Some(_)) => Frontend::Terminal,
        }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excludes
            .as_ref()
            .is_some_and(|set| set.is_match(path))
    }
}

fn installed(tool: ToolCommand) -> Capability<ToolCommand> {
    if tool.is_installed() {
        Capability::Available(tool)
    } else {
        Capability::Unavailable
    }
}

fn resolve_tool(
    cli: Option<&str>,
    keys: &[&str],
    env: &dyn Fn(&str) -> Option<String>,
    fallback: &str,
) -> ToolCommand {
    cli.and_then(ToolCommand::parse)
        .or_else(|| {
            keys.iter()
                .filter_map(|key| env(key))
                .find_map(|value| ToolCommand::parse(&value))
        })
        .unwrap_or_else(|| ToolCommand::new(fallback, &[]))
}

fn resolve_color(cli: Option<ColorChoice>, env: &dyn Fn(&str) -> Option<String>) -> ColorChoice {
    if let Some(choice) = cli {
        return choice;
    }
    if env("NO_COLOR").is_some_and(|value| !value.is_empty()) {
        return ColorChoice::Never;
    }
    env("PACNEW_COLOR")
        .and_then(|value| ColorChoice::from_label(&value))
        .unwrap_or_default()
}

fn build_excludes(patterns: &[String]) -> PacnewResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            PacnewError::InvalidArgument(format!("invalid exclude glob '{pattern}': {err}"))
        })?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|err| PacnewError::InvalidArgument(format!("unable to build exclude globs: {err}")))
}

#[cfg(test)]
pub fn test_config(root: &Path) -> Config {
    Config {
        root: root.to_path_buf(),
        recursive: false,
        excludes: None,
        editor: Capability::Available(ToolCommand::new("true", &[])),
        diff_tool: Capability::Unavailable,
        merge_tool: Capability::Available(ToolCommand::new("true", &[])),
        color: false,
        utc_offset: UtcOffset::UTC,
        frontend: FrontendChoice::Terminal,
        yad: Capability::Unavailable,
        has_display: false,
        finder: Finder::Builtin,
        elevation: Capability::Unavailable,
        edit_strategy: EditStrategy::CopyEdit,
        notifier: Capability::Unavailable,
    }
}
