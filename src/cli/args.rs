//! Defines the command-line arguments and subcommands for the harness CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "recon-harness",
    version,
    about = "Verifies log reconstruction and line merging against reference fixtures."
)]
pub struct HarnessArgs {
    /// Harness configuration file (YAML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Full pipeline: acquire, reconstruct, verify, merge, verify, teardown.
    Run {
        /// Remove the fixture bundle during teardown as well.
        #[arg(long)]
        full_reset: bool,
        /// Keep the working output trees for inspection.
        #[arg(long)]
        keep: bool,
        /// Also fail when an expected file was not produced.
        #[arg(long)]
        strict: bool,
        /// Use this local archive instead of downloading the fixtures.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Make sure the fixture bundle is present.
    Fetch {
        /// Use this local archive instead of downloading the fixtures.
        #[arg(long)]
        archive: Option<PathBuf>,
        /// Fetch again even if the bundle is already complete.
        #[arg(long)]
        force: bool,
    },
    /// Compare a produced tree with an expected tree byte-for-byte.
    Compare {
        /// The produced output tree.
        #[arg(required = true)]
        actual: PathBuf,
        /// The expected output tree.
        #[arg(required = true)]
        expected: PathBuf,
        /// Also fail when an expected file was not produced.
        #[arg(long)]
        strict: bool,
        /// Print the comparison report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Remove the working trees (and with --all the fixture bundle).
    Clean {
        #[arg(long)]
        all: bool,
    },
    /// Parse range selectors and print the integers they select.
    Ranges {
        /// Selectors such as "1-55" or "2,3,5,10,20,40".
        #[arg(required = true)]
        selectors: Vec<String>,
    },
}
