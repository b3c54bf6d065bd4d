//! # Verification Pipeline
//!
//! Drives one verification run from start to finish:
//!
//! 1. **Acquire**: make sure the fixture bundle is present
//! 2. **Reconstruct**: run the reconstruction step into a fresh output tree
//! 3. **Verify**: compare that tree with the expected reconstruction
//! 4. **Merge**: copy every `.info` file aside and run the line merge on it
//! 5. **Verify**: compare the merged tree with the expected merge output
//! 6. **Teardown**: remove the run's working state, pass or fail
//!
//! Before the first stage, roots that contain one another are rejected and
//! stale working state from an aborted run is removed (reported as a teardown
//! stage). Stages run strictly in order and the first failure ends the run.
//! Progress is reported through a [`ProgressSink`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::compare::{self, ComparisonReport};
use crate::config::{HarnessConfig, DEFAULT_MERGE_SUFFIX};
use crate::diagnostics::HarnessError;
use crate::fixtures::{self, AcquireOptions, Acquisition, ArchiveSource};
use crate::layout::HarnessLayout;
use crate::teardown::{self, RemovalStats};
use crate::transform::{LineMerger, ReconstructionRequest, Reconstructor};

// ============================================================================
// STAGES AND PROGRESS SINKS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Reconstruct,
    VerifyReconstruction,
    Merge,
    VerifyMerge,
    Teardown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Reconstruct => "reconstruct",
            Stage::VerifyReconstruction => "verify-reconstruction",
            Stage::Merge => "merge",
            Stage::VerifyMerge => "verify-merge",
            Stage::Teardown => "teardown",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives progress events from a run.
pub trait ProgressSink {
    fn stage_started(&mut self, stage: Stage);
    fn stage_finished(&mut self, stage: Stage, detail: &str);
    fn stage_failed(&mut self, stage: Stage, error: &HarnessError);

    /// Called with each comparison report before its verdict is taken.
    fn comparison(&mut self, _stage: Stage, _report: &ComparisonReport) {}

    /// Free-form notes that are not tied to a stage outcome.
    fn note(&mut self, _text: &str) {}
}

/// Discards all progress.
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn stage_started(&mut self, _stage: Stage) {}
    fn stage_finished(&mut self, _stage: Stage, _detail: &str) {}
    fn stage_failed(&mut self, _stage: Stage, _error: &HarnessError) {}
}

/// Collects progress as plain lines, for tests and programmatic capture.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub lines: Vec<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl ProgressSink for BufferSink {
    fn stage_started(&mut self, stage: Stage) {
        self.lines.push(format!("[{}] started", stage));
    }

    fn stage_finished(&mut self, stage: Stage, detail: &str) {
        self.lines.push(format!("[{}] ok: {}", stage, detail));
    }

    fn stage_failed(&mut self, stage: Stage, error: &HarnessError) {
        self.lines.push(format!("[{}] failed: {}", stage, error));
    }

    fn note(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}

// ============================================================================
// RUN
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Also fail on fixture files a step did not produce.
    pub strict: bool,
    /// Remove the fixture bundle during teardown too.
    pub full_reset: bool,
    /// Skip teardown of the working trees.
    pub keep_outputs: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub acquisition: Acquisition,
    pub reconstruction: ComparisonReport,
    pub merged_files: usize,
    pub merge: ComparisonReport,
    pub removed: RemovalStats,
}

/// One configured verification run.
pub struct VerificationRun<'a> {
    layout: HarnessLayout,
    request: ReconstructionRequest,
    source: &'a dyn ArchiveSource,
    acquire: AcquireOptions,
    merge_suffix: String,
    options: RunOptions,
}

impl<'a> VerificationRun<'a> {
    pub fn new(
        layout: HarnessLayout,
        request: ReconstructionRequest,
        source: &'a dyn ArchiveSource,
    ) -> Self {
        Self {
            layout,
            request,
            source,
            acquire: AcquireOptions::default(),
            merge_suffix: DEFAULT_MERGE_SUFFIX.to_string(),
            options: RunOptions::default(),
        }
    }

    pub fn from_config(config: &HarnessConfig, source: &'a dyn ArchiveSource) -> Self {
        Self::new(config.layout(), config.request(), source)
            .with_acquire_options(config.acquire_options(false))
            .with_merge_suffix(&config.merge_suffix)
            .with_options(RunOptions {
                strict: config.strict,
                full_reset: config.full_reset,
                keep_outputs: config.keep_outputs,
            })
    }

    pub fn with_acquire_options(mut self, acquire: AcquireOptions) -> Self {
        self.acquire = acquire;
        self
    }

    pub fn with_merge_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.merge_suffix = suffix.into();
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn layout(&self) -> &HarnessLayout {
        &self.layout
    }

    /// Runs every stage in order. Teardown runs whether or not the earlier
    /// stages succeeded; the first failure is what gets returned.
    pub fn execute<R, M>(
        &self,
        reconstructor: &mut R,
        merger: &mut M,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunSummary, HarnessError>
    where
        R: Reconstructor + ?Sized,
        M: LineMerger + ?Sized,
    {
        if !self.layout.roots_are_disjoint() {
            let err = HarnessError::config(format!(
                "working root {} and fixture root {} must not contain one another",
                self.layout.working_root().display(),
                self.layout.fixture_root().display()
            ));
            sink.stage_failed(Stage::Teardown, &err);
            return Err(err);
        }

        // Leftovers from an aborted earlier run would pollute the comparison.
        let working_root = self.layout.working_root();
        run_stage(
            sink,
            Stage::Teardown,
            || teardown::remove_tree(working_root),
            |stats| {
                if stats.is_empty() {
                    "no stale working state".to_string()
                } else {
                    format!("cleared {} stale files from an earlier run", stats.files)
                }
            },
        )?;

        let outcome = self.verify(reconstructor, merger, sink);

        let removed = if self.options.keep_outputs {
            sink.note(&format!(
                "keeping working trees under {}",
                self.layout.working_root().display()
            ));
            Ok(RemovalStats::default())
        } else {
            let full_reset = self.options.full_reset;
            let layout = &self.layout;
            run_stage(
                sink,
                Stage::Teardown,
                || teardown::cleanup(layout, full_reset),
                |stats| format!("removed {} files and {} directories", stats.files, stats.dirs),
            )
        };

        match (outcome, removed) {
            (Ok(mut summary), Ok(removed)) => {
                summary.removed = removed;
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(teardown_error)) => {
                sink.note(&format!("teardown after failure also failed: {}", teardown_error));
                Err(e)
            }
        }
    }

    fn verify<R, M>(
        &self,
        reconstructor: &mut R,
        merger: &mut M,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunSummary, HarnessError>
    where
        R: Reconstructor + ?Sized,
        M: LineMerger + ?Sized,
    {
        let layout = &self.layout;
        let strict = self.options.strict;

        let acquisition = run_stage(
            sink,
            Stage::Acquire,
            || fixtures::acquire(layout, self.source, &self.acquire),
            |a| match a {
                Acquisition::Reused => {
                    format!("reusing {}", layout.fixture_root().display())
                }
                Acquisition::Downloaded { sha256, bytes, entries } => format!(
                    "{} entries ({} bytes, sha256 {}) from {}",
                    entries,
                    bytes,
                    sha256,
                    self.source.describe()
                ),
            },
        )?;

        run_stage(
            sink,
            Stage::Reconstruct,
            || reconstruct_outputs(layout, &self.request, reconstructor),
            |count| format!("{} files under {}", count, layout.output_dir().display()),
        )?;

        let reconstruction = verify_stage(
            sink,
            Stage::VerifyReconstruction,
            &layout.output_dir(),
            &layout.expected_dir(),
            strict,
        )?;

        let suffix = self.merge_suffix.as_str();
        let merged_files = run_stage(
            sink,
            Stage::Merge,
            || merge_outputs(layout, suffix, merger),
            |count| format!("{} '{}' files merged", count, suffix),
        )?;

        let merge = verify_stage(
            sink,
            Stage::VerifyMerge,
            &layout.merged_output_dir(),
            &layout.expected_merged_dir(),
            strict,
        )?;

        Ok(RunSummary {
            acquisition,
            reconstruction,
            merged_files,
            merge,
            removed: RemovalStats::default(),
        })
    }
}

fn run_stage<T>(
    sink: &mut dyn ProgressSink,
    stage: Stage,
    work: impl FnOnce() -> Result<T, HarnessError>,
    detail: impl FnOnce(&T) -> String,
) -> Result<T, HarnessError> {
    sink.stage_started(stage);
    match work() {
        Ok(value) => {
            sink.stage_finished(stage, &detail(&value));
            Ok(value)
        }
        Err(e) => {
            sink.stage_failed(stage, &e);
            Err(e)
        }
    }
}

fn verify_stage(
    sink: &mut dyn ProgressSink,
    stage: Stage,
    actual: &Path,
    expected: &Path,
    strict: bool,
) -> Result<ComparisonReport, HarnessError> {
    sink.stage_started(stage);
    let verdict = compare::compare_trees(actual, expected).and_then(|report| {
        sink.comparison(stage, &report);
        report.into_verdict(stage.as_str(), strict)
    });
    match verdict {
        Ok(report) => {
            sink.stage_finished(stage, &report.summary());
            Ok(report)
        }
        Err(e) => {
            sink.stage_failed(stage, &e);
            Err(e)
        }
    }
}

// ============================================================================
// STAGE OPERATIONS
// ============================================================================

/// Runs the reconstruction step into a freshly created output directory and
/// returns how many files it produced.
pub fn reconstruct_outputs<R>(
    layout: &HarnessLayout,
    request: &ReconstructionRequest,
    reconstructor: &mut R,
) -> Result<usize, HarnessError>
where
    R: Reconstructor + ?Sized,
{
    let output_dir = layout.output_dir();
    teardown::remove_tree(&output_dir)?;
    fs::create_dir_all(&output_dir).map_err(|e| HarnessError::io(&output_dir, e))?;
    reconstructor.reconstruct(request, &output_dir)?;
    Ok(compare::list_files(&output_dir)?.len())
}

/// Files under the reconstruction output whose name ends in `suffix`, as
/// sorted paths relative to the output directory.
pub fn merge_targets(layout: &HarnessLayout, suffix: &str) -> Result<Vec<PathBuf>, HarnessError> {
    Ok(compare::list_files(&layout.output_dir())?
        .into_iter()
        .filter(|rel| {
            rel.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        })
        .collect())
}

/// Copies each merge target into a fresh merge output directory and invokes
/// the merge on it. Returns the number of files merged.
pub fn merge_outputs<M>(
    layout: &HarnessLayout,
    suffix: &str,
    merger: &mut M,
) -> Result<usize, HarnessError>
where
    M: LineMerger + ?Sized,
{
    let context_dir = layout.output_dir();
    let dest_root = layout.merged_output_dir();
    teardown::remove_tree(&dest_root)?;
    fs::create_dir_all(&dest_root).map_err(|e| HarnessError::io(&dest_root, e))?;

    let targets = merge_targets(layout, suffix)?;
    for relative in &targets {
        let source = context_dir.join(relative);
        let copy = dest_root.join(relative);
        let dest_dir = copy.parent().unwrap_or(&dest_root).to_path_buf();
        fs::create_dir_all(&dest_dir).map_err(|e| HarnessError::io(&dest_dir, e))?;
        fs::copy(&source, &copy).map_err(|e| HarnessError::io(&copy, e))?;
        merger.merge_lines(&source, &context_dir, &dest_dir)?;
    }
    Ok(targets.len())
}
