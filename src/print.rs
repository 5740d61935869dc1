//! Text rendering for diagnostics and reports.

use std::fmt::Write;

use crate::validation::{Diagnostic, ValidationReport};

/// Width of the severity tag plus its trailing space.
const NOTE_INDENT: &str = "       ";

/// Format a shape like a Python tuple: `(512, 1024)`, `(5,)`, `()`.
pub fn shape_tuple(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({single},)"),
        dims => {
            let parts: Vec<_> = dims.iter().map(usize::to_string).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// `[ OK ] message` followed by indented note lines.
pub fn render_diagnostic(diagnostic: &Diagnostic) -> String {
    let mut out = format!("{} {}", diagnostic.severity.tag(), diagnostic.message);
    for note in &diagnostic.notes {
        out.push('\n');
        out.push_str(NOTE_INDENT);
        out.push_str(note);
    }
    out
}

/// Full text block for one file, as printed by `check`.
pub fn render_report(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nopening file '{}'\n", report.source);
    for diagnostic in &report.diagnostics {
        let _ = writeln!(out, "{}", render_diagnostic(diagnostic));
    }
    out
}
