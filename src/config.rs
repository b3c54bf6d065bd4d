//! # Harness Configuration
//!
//! A run is described by a YAML file. Every field is optional; the defaults
//! reproduce the reference reconstruction check (records `1-55`, runs `1-10`,
//! targets `2,3,5,10,20,40`). Relative paths in the file are resolved against
//! the directory the file lives in, never against the process working
//! directory.
//!
//! ```yaml
//! working_root: exdata
//! fixture_root: test-data
//! label: reconstruction
//! producer: RECONSTRUCTOR
//! records: "1-55"
//! targets: "2,3,5,10,20,40"
//! reconstruct:
//!   program: python
//!   args: ["log_reconstruct.py", "{input}", "{label}", "{producer}", "{comment}",
//!          "{records}", "{runs}", "{targets}"]
//! merge:
//!   program: python
//!   args: ["merge_lines_in_info_files.py", "{file}", "{context}", "{dest}"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::HarnessError;
use crate::fixtures::{
    AcquireOptions, ArchiveSource, HttpArchive, LocalArchive, DEFAULT_FIXTURE_URL,
    DEFAULT_TIMEOUT_SECS,
};
use crate::layout::{HarnessLayout, DEFAULT_INPUT_DIR};
use crate::range::RangeSelector;
use crate::transform::{CommandSpec, ReconstructionRequest};

pub const DEFAULT_MERGE_SUFFIX: &str = ".info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub working_root: PathBuf,
    pub fixture_root: PathBuf,
    pub fixture_url: String,
    /// Local archive used instead of `fixture_url` when set.
    pub fixture_archive: Option<PathBuf>,
    pub fixture_sha256: Option<String>,
    pub download_timeout_secs: u64,
    pub input_dir: String,
    pub label: String,
    pub producer: String,
    pub comment: String,
    pub records: RangeSelector,
    pub runs: RangeSelector,
    pub targets: RangeSelector,
    pub merge_suffix: String,
    pub strict: bool,
    pub full_reset: bool,
    pub keep_outputs: bool,
    pub reconstruct: Option<CommandSpec>,
    pub merge: Option<CommandSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            working_root: PathBuf::from("exdata"),
            fixture_root: PathBuf::from("test-data"),
            fixture_url: DEFAULT_FIXTURE_URL.to_string(),
            fixture_archive: None,
            fixture_sha256: None,
            download_timeout_secs: DEFAULT_TIMEOUT_SECS,
            input_dir: DEFAULT_INPUT_DIR.to_string(),
            label: "reconstruction".to_string(),
            producer: "RECONSTRUCTOR".to_string(),
            comment: "A test for reconstruction of logger output".to_string(),
            records: RangeSelector::from_values(1..=55),
            runs: RangeSelector::from_values(1..=10),
            targets: RangeSelector::from_values([2, 3, 5, 10, 20, 40]),
            merge_suffix: DEFAULT_MERGE_SUFFIX.to_string(),
            strict: false,
            full_reset: false,
            keep_outputs: false,
            reconstruct: None,
            merge: None,
        }
    }
}

impl HarnessConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::config_with(format!("cannot read {}", path.display()), e)
        })?;
        let config: HarnessConfig = serde_yaml::from_str(&content).map_err(|e| {
            HarnessError::config_with(format!("cannot parse {}", path.display()), e)
        })?;
        let base = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let config = config.resolved_against(&base);
        config.validate()?;
        Ok(config)
    }

    /// Anchors every relative path at `base`.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.working_root);
        anchor(&mut self.fixture_root);
        if let Some(archive) = self.fixture_archive.as_mut() {
            anchor(archive);
        }
        for spec in [self.reconstruct.as_mut(), self.merge.as_mut()].into_iter().flatten() {
            if let Some(dir) = spec.working_dir.as_mut() {
                anchor(dir);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.label.trim().is_empty() {
            return Err(HarnessError::config("label must not be empty"));
        }
        if self.label.contains(['/', '\\']) || self.label == "." || self.label == ".." {
            return Err(HarnessError::config(format!(
                "label '{}' must be a single directory name",
                self.label
            )));
        }
        if self.merge_suffix.is_empty() {
            return Err(HarnessError::config("merge_suffix must not be empty"));
        }
        if !self.layout().roots_are_disjoint() {
            return Err(HarnessError::config(format!(
                "working_root {} and fixture_root {} must not contain one another",
                self.working_root.display(),
                self.fixture_root.display()
            )));
        }
        Ok(())
    }

    pub fn layout(&self) -> HarnessLayout {
        HarnessLayout::new(&self.working_root, &self.fixture_root, &self.label)
            .with_input_dir(&self.input_dir)
    }

    pub fn request(&self) -> ReconstructionRequest {
        ReconstructionRequest {
            input_dir: self.layout().input_dir(),
            label: self.label.clone(),
            producer: self.producer.clone(),
            comment: self.comment.clone(),
            records: self.records.clone(),
            runs: self.runs.clone(),
            targets: self.targets.clone(),
        }
    }

    pub fn archive_source(&self) -> Box<dyn ArchiveSource> {
        match &self.fixture_archive {
            Some(path) => Box::new(LocalArchive::new(path)),
            None => Box::new(
                HttpArchive::new(&self.fixture_url)
                    .with_timeout(Duration::from_secs(self.download_timeout_secs)),
            ),
        }
    }

    pub fn acquire_options(&self, force: bool) -> AcquireOptions {
        AcquireOptions {
            expected_sha256: self.fixture_sha256.clone(),
            force,
        }
    }
}
