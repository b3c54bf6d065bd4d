//! The harness command-line interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions. Every handler returns a [`HarnessError`] on
//! failure; [`run`] renders it and exits with the error category's code.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use termcolor::ColorChoice;

use crate::cli::args::{Command, HarnessArgs};
use crate::compare;
use crate::config::HarnessConfig;
use crate::diagnostics::{print_error, HarnessError};
use crate::fixtures::{self, Acquisition, ArchiveSource, LocalArchive};
use crate::pipeline::VerificationRun;
use crate::range::RangeSelector;
use crate::teardown;
use crate::transform::{CommandMerger, CommandReconstructor};

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = HarnessArgs::parse();
    let stdout_color = output::color_choice(args.no_color, atty::Stream::Stdout);
    let stderr_color = output::color_choice(args.no_color, atty::Stream::Stderr);
    let config_path = args.config.as_deref();

    // Dispatch to the appropriate subcommand handler.
    let result = match args.command {
        Command::Run {
            full_reset,
            keep,
            strict,
            archive,
        } => handle_run(config_path, full_reset, keep, strict, archive, stdout_color, stderr_color),
        Command::Fetch { archive, force } => handle_fetch(config_path, archive, force),
        Command::Compare {
            actual,
            expected,
            strict,
            json,
        } => handle_compare(&actual, &expected, strict, json, stdout_color),
        Command::Clean { all } => handle_clean(config_path, all),
        Command::Ranges { selectors } => handle_ranges(&selectors),
    };

    if let Err(e) = result {
        let code = e.exit_code();
        print_error(e);
        process::exit(code);
    }
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<HarnessConfig, HarnessError> {
    match path {
        Some(path) => HarnessConfig::load(path),
        None => {
            let config = HarnessConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn archive_source(config: &HarnessConfig, archive: Option<PathBuf>) -> Box<dyn ArchiveSource> {
    match archive {
        Some(path) => Box::new(LocalArchive::new(path)),
        None => config.archive_source(),
    }
}

fn handle_run(
    config_path: Option<&Path>,
    full_reset: bool,
    keep: bool,
    strict: bool,
    archive: Option<PathBuf>,
    stdout_color: ColorChoice,
    stderr_color: ColorChoice,
) -> Result<(), HarnessError> {
    let mut config = load_config(config_path)?;
    config.full_reset |= full_reset;
    config.keep_outputs |= keep;
    config.strict |= strict;

    let reconstruct = config
        .reconstruct
        .clone()
        .ok_or_else(|| HarnessError::config("no `reconstruct` command configured"))?;
    let merge = config
        .merge
        .clone()
        .ok_or_else(|| HarnessError::config("no `merge` command configured"))?;

    let source = archive_source(&config, archive);
    let run = VerificationRun::from_config(&config, source.as_ref());
    let mut sink = output::TerminalSink::new(stderr_color);
    let summary = run.execute(
        &mut CommandReconstructor::new(reconstruct),
        &mut CommandMerger::new(merge),
        &mut sink,
    )?;
    output::print_summary(&summary, stdout_color);
    Ok(())
}

fn handle_fetch(
    config_path: Option<&Path>,
    archive: Option<PathBuf>,
    force: bool,
) -> Result<(), HarnessError> {
    let config = load_config(config_path)?;
    let source = archive_source(&config, archive);
    let layout = config.layout();
    match fixtures::acquire(&layout, source.as_ref(), &config.acquire_options(force))? {
        Acquisition::Reused => {
            println!("fixtures already present in {}", layout.fixture_root().display());
        }
        Acquisition::Downloaded {
            sha256,
            bytes,
            entries,
        } => {
            println!(
                "fetched {} ({} bytes, {} entries) into {}",
                source.describe(),
                bytes,
                entries,
                layout.fixture_root().display()
            );
            println!("sha256 {}", sha256);
        }
    }
    Ok(())
}

fn handle_compare(
    actual: &Path,
    expected: &Path,
    strict: bool,
    json: bool,
    color: ColorChoice,
) -> Result<(), HarnessError> {
    let report = compare::compare_trees(actual, expected)?;
    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| HarnessError::config_with("could not serialize report", e))?;
        println!("{}", text);
    } else {
        output::print_report(&report, strict, color);
    }
    report.into_verdict("compare", strict).map(|_| ())
}

fn handle_clean(config_path: Option<&Path>, all: bool) -> Result<(), HarnessError> {
    let config = load_config(config_path)?;
    let stats = teardown::cleanup(&config.layout(), all)?;
    println!(
        "removed {} files and {} directories",
        stats.files, stats.dirs
    );
    Ok(())
}

fn handle_ranges(selectors: &[String]) -> Result<(), HarnessError> {
    for input in selectors {
        let selector = RangeSelector::parse(input)?;
        let values: Vec<String> = selector.iter().map(|v| v.to_string()).collect();
        println!(
            "{} => {} ({} values): {}",
            input,
            selector,
            selector.len(),
            values.join(" ")
        );
    }
    Ok(())
}
