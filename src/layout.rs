//! # Harness Layout
//!
//! Every path a verification run touches is derived here from two explicit
//! roots and the output label. The process working directory is consulted
//! only to anchor relative roots when checking that they do not overlap.
//!
//! ```text
//! <working_root>/<label>            reconstruction output   (owned by the run)
//! <working_root>/<label>-merged     merge output            (owned by the run)
//! <fixture_root>/<input_dir>        raw input archives      (read-only)
//! <fixture_root>/<label>            expected reconstruction (read-only)
//! <fixture_root>/<label>-merged     expected merge output   (read-only)
//! ```

use std::env;
use std::path::{Component, Path, PathBuf};

pub const MERGED_SUFFIX: &str = "-merged";
pub const DEFAULT_INPUT_DIR: &str = "archives-input";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessLayout {
    working_root: PathBuf,
    fixture_root: PathBuf,
    label: String,
    input_dir: String,
}

impl HarnessLayout {
    pub fn new(
        working_root: impl Into<PathBuf>,
        fixture_root: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            working_root: working_root.into(),
            fixture_root: fixture_root.into(),
            label: label.into(),
            input_dir: DEFAULT_INPUT_DIR.to_string(),
        }
    }

    /// Names the fixture subdirectory holding the raw input archives.
    pub fn with_input_dir(mut self, input_dir: impl Into<String>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    pub fn fixture_root(&self) -> &Path {
        &self.fixture_root
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn merged_label(&self) -> String {
        format!("{}{}", self.label, MERGED_SUFFIX)
    }

    pub fn input_dir(&self) -> PathBuf {
        self.fixture_root.join(&self.input_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.working_root.join(&self.label)
    }

    pub fn merged_output_dir(&self) -> PathBuf {
        self.working_root.join(self.merged_label())
    }

    pub fn expected_dir(&self) -> PathBuf {
        self.fixture_root.join(&self.label)
    }

    pub fn expected_merged_dir(&self) -> PathBuf {
        self.fixture_root.join(self.merged_label())
    }

    /// Directory a fixture archive is unpacked into. The archive's top-level
    /// directory is expected to be the fixture root's own name.
    pub fn extract_root(&self) -> PathBuf {
        match self.fixture_root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// True when neither root is the other or lies inside it. Overlapping
    /// roots would let working-tree teardown delete the fixture bundle.
    pub fn roots_are_disjoint(&self) -> bool {
        let working = lexical_absolute(&self.working_root);
        let fixture = lexical_absolute(&self.fixture_root);
        !working.starts_with(&fixture) && !fixture.starts_with(&working)
    }
}

/// Anchors a relative path at the working directory and folds `.` and `..`
/// without touching the filesystem.
fn lexical_absolute(path: &Path) -> PathBuf {
    let mut out = if path.is_relative() {
        env::current_dir().unwrap_or_default()
    } else {
        PathBuf::new()
    };
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
