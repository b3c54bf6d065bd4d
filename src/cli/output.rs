//! Handles all user-facing output for the CLI.
//!
//! Stage progress, comparison reports and content diffs are rendered here so
//! every command prints the same way. Progress goes to stderr; reports and
//! command results go to stdout.

use std::fs;
use std::io::Write;
use std::path::Path;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::compare::ComparisonReport;
use crate::diagnostics::HarnessError;
use crate::pipeline::{ProgressSink, RunSummary, Stage};

/// Files larger than this are never diffed line by line.
const MAX_DIFF_BYTES: u64 = 256 * 1024;
const MAX_DIFF_LINES: usize = 40;
const MAX_LISTED_OFFENCES: usize = 20;

/// Picks a color mode for the given stream.
pub fn color_choice(no_color: bool, stream: atty::Stream) -> ColorChoice {
    if !no_color && atty::is(stream) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

// ============================================================================
// PROGRESS SINK
// ============================================================================

/// TerminalSink: writes colored stage progress to stderr.
pub struct TerminalSink {
    stream: StandardStream,
}

impl TerminalSink {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stream: StandardStream::stderr(choice),
        }
    }

    fn status(&mut self, tag: &str, color: Color, stage: Stage, text: &str) {
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(self.stream, "{:>6}", tag);
        let _ = self.stream.reset();
        let _ = writeln!(self.stream, " {:<22} {}", stage, text);
    }
}

impl ProgressSink for TerminalSink {
    fn stage_started(&mut self, stage: Stage) {
        self.status("...", Color::Cyan, stage, "");
    }

    fn stage_finished(&mut self, stage: Stage, detail: &str) {
        self.status("ok", Color::Green, stage, detail);
    }

    fn stage_failed(&mut self, stage: Stage, error: &HarnessError) {
        self.status("FAIL", Color::Red, stage, &error.to_string());
    }

    fn comparison(&mut self, _stage: Stage, report: &ComparisonReport) {
        if !report.mismatched.is_empty() {
            let _ = write_report(&mut self.stream, report, false);
        }
    }

    fn note(&mut self, text: &str) {
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = writeln!(self.stream, "  note: {}", text);
        let _ = self.stream.reset();
    }
}

// ============================================================================
// CORE OUTPUT FUNCTIONS
// ============================================================================

/// Prints a comparison report to stdout.
pub fn print_report(report: &ComparisonReport, strict: bool, choice: ColorChoice) {
    let mut stdout = StandardStream::stdout(choice);
    let _ = write_report(&mut stdout, report, strict);
}

/// Prints the outcome of a successful run to stdout.
pub fn print_summary(summary: &RunSummary, choice: ColorChoice) {
    let mut stdout = StandardStream::stdout(choice);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    let _ = writeln!(stdout, "PASS");
    let _ = stdout.reset();
    let _ = writeln!(stdout, "  reconstruction: {}", summary.reconstruction.summary());
    let _ = writeln!(
        stdout,
        "  merge:          {} ({} files merged)",
        summary.merge.summary(),
        summary.merged_files
    );
    let _ = writeln!(
        stdout,
        "  teardown:       {} files, {} directories removed",
        summary.removed.files, summary.removed.dirs
    );
}

fn write_report<W: WriteColor>(
    out: &mut W,
    report: &ComparisonReport,
    strict: bool,
) -> std::io::Result<()> {
    let passed = report.passed(strict);
    out.set_color(
        ColorSpec::new()
            .set_fg(Some(if passed { Color::Green } else { Color::Red }))
            .set_bold(true),
    )?;
    write!(out, "{}", if passed { "MATCH" } else { "MISMATCH" })?;
    out.reset()?;
    writeln!(
        out,
        " {} vs {}: {}",
        report.actual_root.display(),
        report.expected_root.display(),
        report.summary()
    )?;

    let offences = report.offences(strict);
    for (path, reason) in offences.iter().take(MAX_LISTED_OFFENCES) {
        writeln!(out, "  {}: {}", path.display(), reason)?;
    }
    if offences.len() > MAX_LISTED_OFFENCES {
        writeln!(out, "  ... and {} more", offences.len() - MAX_LISTED_OFFENCES)?;
    }

    for mismatch in report.mismatched.iter().take(MAX_LISTED_OFFENCES) {
        let actual = report.actual_root.join(&mismatch.path);
        let expected = report.expected_root.join(&mismatch.path);
        if let Some(changeset) = text_changeset(&actual, &expected) {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
            writeln!(out, "--- {} (expected) / +++ produced", mismatch.path.display())?;
            out.reset()?;
            write_diff(out, &changeset.diffs)?;
        }
    }
    Ok(())
}

/// Line diff from expected to actual, when both files are small UTF-8 text.
fn text_changeset(actual: &Path, expected: &Path) -> Option<Changeset> {
    let small = |p: &Path| fs::metadata(p).map(|m| m.len() <= MAX_DIFF_BYTES).unwrap_or(false);
    if !small(actual) || !small(expected) {
        return None;
    }
    let actual = String::from_utf8(fs::read(actual).ok()?).ok()?;
    let expected = String::from_utf8(fs::read(expected).ok()?).ok()?;
    Some(Changeset::new(&expected, &actual, "\n"))
}

fn write_diff<W: WriteColor>(out: &mut W, diffs: &[Difference]) -> std::io::Result<()> {
    let mut written = 0;
    for diff in diffs {
        let (prefix, color, text) = match diff {
            Difference::Same(x) => (' ', None, x),
            Difference::Add(x) => ('+', Some(Color::Green), x),
            Difference::Rem(x) => ('-', Some(Color::Red), x),
        };
        // Unchanged runs only get their edges shown.
        let lines: Vec<&str> = text.split('\n').collect();
        let shown: Vec<&str> = if color.is_none() && lines.len() > 4 {
            let mut edge = lines[..2].to_vec();
            edge.push("...");
            edge.extend_from_slice(&lines[lines.len() - 2..]);
            edge
        } else {
            lines
        };
        for line in shown {
            if written == MAX_DIFF_LINES {
                out.reset()?;
                writeln!(out, "  (diff truncated)")?;
                return Ok(());
            }
            match color {
                Some(c) => out.set_color(ColorSpec::new().set_fg(Some(c)))?,
                None => out.reset()?,
            }
            writeln!(out, "{}{}", prefix, line)?;
            written += 1;
        }
    }
    out.reset()
}
