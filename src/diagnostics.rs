//! # Harness Diagnostics
//!
//! This module defines the unified, `miette`-based error type for the harness.
//! Every failure raised by any phase of a verification run (acquisition,
//! transformation, verification, teardown) is a [`HarnessError`]. The binary
//! renders them with [`print_error`]; the library only ever returns them.
//!
//! # Error Taxonomy
//!
//! - **Acquisition**: the fixture bundle could not be downloaded or unpacked.
//! - **Verification**: a produced file differs from its fixture, or has none.
//! - **Teardown**: a working tree could not be removed, or was not a tree.
//! - **Range / Config**: the run was misconfigured before anything happened.
//! - **Transform**: an external transformation step reported failure.
//! - **Io**: any other filesystem failure, always tagged with the path.

use std::io;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`HarnessError`], used for exit codes and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Acquisition,
    Verification,
    Teardown,
    Configuration,
    Transformation,
    Io,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Acquisition => "acquisition",
            ErrorCategory::Verification => "verification",
            ErrorCategory::Teardown => "teardown",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Transformation => "transformation",
            ErrorCategory::Io => "io",
        }
    }

    /// Process exit code the CLI uses for this category.
    pub const fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Verification => 1,
            ErrorCategory::Configuration => 2,
            ErrorCategory::Acquisition => 3,
            ErrorCategory::Transformation => 4,
            ErrorCategory::Teardown | ErrorCategory::Io => 5,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for every harness failure mode.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("Fixture acquisition failed: {message}")]
    #[diagnostic(
        code(recon::acquisition),
        help("check the fixture URL or pass a local archive; acquisition is never retried")
    )]
    Acquisition {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Verification failed in {stage}: {path}: {reason}")]
    #[diagnostic(code(recon::verification))]
    Verification {
        stage: String,
        path: PathBuf,
        reason: String,
        #[help]
        summary: Option<String>,
    },

    #[error("Teardown failed at {path}: {message}")]
    #[diagnostic(code(recon::teardown))]
    Teardown {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Invalid range selector '{input}': {message}")]
    #[diagnostic(
        code(recon::range),
        help("use comma-separated positive integers, 'a-b' ranges or '<n'")
    )]
    Range { input: String, message: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(recon::config))]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("{step} step failed: {message}")]
    #[diagnostic(code(recon::transform))]
    Transform {
        step: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("I/O error at {path}: {source}")]
    #[diagnostic(code(recon::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HarnessError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        HarnessError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn acquisition(message: impl Into<String>) -> Self {
        HarnessError::Acquisition {
            message: message.into(),
            source: None,
        }
    }

    pub fn acquisition_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HarnessError::Acquisition {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        HarnessError::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HarnessError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn transform(step: impl Into<String>, message: impl Into<String>) -> Self {
        HarnessError::Transform {
            step: step.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn teardown(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        HarnessError::Teardown {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            HarnessError::Acquisition { .. } => ErrorCategory::Acquisition,
            HarnessError::Verification { .. } => ErrorCategory::Verification,
            HarnessError::Teardown { .. } => ErrorCategory::Teardown,
            HarnessError::Range { .. } | HarnessError::Config { .. } => {
                ErrorCategory::Configuration
            }
            HarnessError::Transform { .. } => ErrorCategory::Transformation,
            HarnessError::Io { .. } => ErrorCategory::Io,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }
}

/// Renders a [`HarnessError`] with full miette diagnostics on stderr.
pub fn print_error(error: HarnessError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}
