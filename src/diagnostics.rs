//! Diagnostic rendering for the command line.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use trellis_core::{CompilationPhase, Diagnostic, Severity};

/// Get the display color for a compilation phase.
pub fn phase_color(phase: &CompilationPhase) -> Color {
    match phase {
        CompilationPhase::Lexing => Color::Red,
        CompilationPhase::Parsing => Color::Red,
        CompilationPhase::Analysis => Color::Magenta,
        CompilationPhase::Codegen => Color::Cyan,
        CompilationPhase::Driver => Color::Blue,
    }
}

/// Normalize a span to ensure end > start (required by ariadne).
pub fn normalize_span(start: usize, end: usize) -> (usize, usize) {
    (start, end.max(start + 1))
}

fn report_kind(severity: Severity) -> ReportKind<'static> {
    match severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    }
}

fn report<'a>(diag: &'a Diagnostic, text: &str, color: bool) -> Report<'a, (&'a str, Range<usize>)> {
    let name = diag.template.as_str();
    let (start, end) = normalize_span(diag.span.start, diag.span.end);
    let (start, end) = (start.min(text.len()), end.min(text.len().max(1)));
    Report::build(report_kind(diag.severity), (name, start..end))
        .with_code(format!("{:?}", diag.kind))
        .with_message(&diag.message)
        .with_label(
            Label::new((name, start..end))
                .with_message(format!("{:?}", diag.phase))
                .with_color(phase_color(&diag.phase)),
        )
        .with_config(Config::default().with_color(color))
        .finish()
}

/// Render `diag` without colors against the template text it was reported on.
///
/// Driver diagnostics have no meaningful location, and `source` is `None`
/// when the text could not be read; both fall back to the one-line form.
pub fn render_diagnostic(diag: &Diagnostic, source: Option<&str>) -> String {
    let Some(text) = source.filter(|_| diag.phase != CompilationPhase::Driver) else {
        return format!("{diag}\n");
    };
    let mut out = Vec::new();
    report(diag, text, false)
        .write((diag.template.as_str(), Source::from(text)), &mut out)
        .ok();
    String::from_utf8_lossy(&out).into_owned()
}

/// Print a diagnostic using ariadne for pretty output.
pub fn print_diagnostic(diag: &Diagnostic, source: Option<&str>) {
    match source.filter(|_| diag.phase != CompilationPhase::Driver) {
        Some(text) => {
            report(diag, text, true)
                .eprint((diag.template.as_str(), Source::from(text)))
                .ok();
        }
        None => eprintln!("{diag}"),
    }
}
