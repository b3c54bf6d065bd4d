//! # Transformations Under Test
//!
//! The reconstruction and merge steps are external collaborators. The harness
//! only knows how to call them ([`Reconstructor`], [`LineMerger`]) and looks at
//! nothing but the files they leave behind.
//!
//! Both traits are implemented for plain closures, which is how tests and
//! embedders plug in an in-process implementation. [`CommandReconstructor`]
//! and [`CommandMerger`] run an external program instead, with the call's
//! parameters substituted into its argument template.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::diagnostics::HarnessError;
use crate::range::RangeSelector;

const STDERR_TAIL_LINES: usize = 20;

/// Everything the reconstruction step is told about the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconstructionRequest {
    pub input_dir: PathBuf,
    pub label: String,
    pub producer: String,
    pub comment: String,
    pub records: RangeSelector,
    pub runs: RangeSelector,
    pub targets: RangeSelector,
}

/// Rebuilds logger output from raw archives into `output_dir`.
pub trait Reconstructor {
    fn reconstruct(
        &mut self,
        request: &ReconstructionRequest,
        output_dir: &Path,
    ) -> Result<(), HarnessError>;
}

impl<F> Reconstructor for F
where
    F: FnMut(&ReconstructionRequest, &Path) -> Result<(), HarnessError>,
{
    fn reconstruct(
        &mut self,
        request: &ReconstructionRequest,
        output_dir: &Path,
    ) -> Result<(), HarnessError> {
        self(request, output_dir)
    }
}

/// Merges split or duplicated lines of one reconstructed file.
///
/// `source` is the file inside `context_dir`; a copy of it already sits in
/// `dest_dir` and is the file the merge is expected to rewrite.
pub trait LineMerger {
    fn merge_lines(
        &mut self,
        source: &Path,
        context_dir: &Path,
        dest_dir: &Path,
    ) -> Result<(), HarnessError>;
}

impl<F> LineMerger for F
where
    F: FnMut(&Path, &Path, &Path) -> Result<(), HarnessError>,
{
    fn merge_lines(
        &mut self,
        source: &Path,
        context_dir: &Path,
        dest_dir: &Path,
    ) -> Result<(), HarnessError> {
        self(source, context_dir, dest_dir)
    }
}

// ============================================================================
// EXTERNAL COMMANDS
// ============================================================================

/// An external program and its argument template.
///
/// Arguments may contain `{name}` placeholders which are replaced before the
/// program runs. Unknown placeholders are passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    /// The argument list with every known placeholder substituted.
    pub fn render_args(&self, vars: &[(&str, String)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{}}}", name), value)
                })
            })
            .collect()
    }

    fn run(&self, step: &str, vars: &[(&str, String)]) -> Result<(), HarnessError> {
        let mut command = Command::new(&self.program);
        command.args(self.render_args(vars));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| HarnessError::Transform {
            step: step.to_string(),
            message: format!("could not start '{}'", self.program),
            source: Some(Box::new(e)),
        })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Err(HarnessError::transform(
            step,
            if tail.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                format!("'{}' exited with {}:\n{}", self.program, output.status, tail)
            },
        ))
    }
}

/// Runs reconstruction as an external program.
///
/// Placeholders: `{input}`, `{output}`, `{label}`, `{producer}`, `{comment}`,
/// `{records}`, `{runs}`, `{targets}`.
#[derive(Debug, Clone)]
pub struct CommandReconstructor {
    spec: CommandSpec,
}

impl CommandReconstructor {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    pub fn placeholders(request: &ReconstructionRequest, output_dir: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("input", request.input_dir.display().to_string()),
            ("output", output_dir.display().to_string()),
            ("label", request.label.clone()),
            ("producer", request.producer.clone()),
            ("comment", request.comment.clone()),
            ("records", request.records.to_string()),
            ("runs", request.runs.to_string()),
            ("targets", request.targets.to_string()),
        ]
    }
}

impl Reconstructor for CommandReconstructor {
    fn reconstruct(
        &mut self,
        request: &ReconstructionRequest,
        output_dir: &Path,
    ) -> Result<(), HarnessError> {
        self.spec
            .run("reconstruction", &Self::placeholders(request, output_dir))
    }
}

/// Runs the line merge as an external program, once per file.
///
/// Placeholders: `{file}`, `{context}`, `{dest}`.
#[derive(Debug, Clone)]
pub struct CommandMerger {
    spec: CommandSpec,
}

impl CommandMerger {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl LineMerger for CommandMerger {
    fn merge_lines(
        &mut self,
        source: &Path,
        context_dir: &Path,
        dest_dir: &Path,
    ) -> Result<(), HarnessError> {
        let vars = [
            ("file", source.display().to_string()),
            ("context", context_dir.display().to_string()),
            ("dest", dest_dir.display().to_string()),
        ];
        self.spec.run("merge", &vars)
    }
}
