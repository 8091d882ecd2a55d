use std::fmt::Write;

use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};

pub const DEFAULT_CONTEXT: usize = 3;

/// Unified diff of `old` against `new`, used when no diff viewer is
/// installed. Returns an empty string for identical inputs.
pub fn render_unified(
    old_label: &str,
    new_label: &str,
    old: &str,
    new: &str,
    context: usize,
    colorize: bool,
) -> String {
    let diff = TextDiff::configure()
        .algorithm(similar::Algorithm::Myers)
        .diff_lines(old, new);

    let mut out = String::new();
    let groups = diff.grouped_ops(context);
    if groups.is_empty() {
        return out;
    }
    let _ = writeln!(out, "--- {old_label}");
    let _ = writeln!(out, "+++ {new_label}");

    for group in &groups {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let old_len = last.old_range().end - old_start;
        let new_start = first.new_range().start;
        let new_len = last.new_range().end - new_start;
        let header = format!(
            "@@ -{},{old_len} +{},{new_len} @@",
            old_start + 1,
            new_start + 1
        );
        if colorize {
            let _ = writeln!(out, "{}", header.cyan());
        } else {
            let _ = writeln!(out, "{header}");
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                let mut line = format!("{sign}{}", change.value());
                if change.missing_newline() {
                    line.push('\n');
                }
                match (colorize, change.tag()) {
                    (true, ChangeTag::Delete) => out.push_str(&line.red().to_string()),
                    (true, ChangeTag::Insert) => out.push_str(&line.green().to_string()),
                    _ => out.push_str(&line),
                }
            }
        }
    }

    out
}
