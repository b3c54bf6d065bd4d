//! # Tree Comparison
//!
//! Byte-for-byte comparison of a produced output tree against the expected
//! tree from the fixture bundle. Files are paired by relative path. The result
//! is a [`ComparisonReport`] listing every pair, which callers turn into a
//! pass/fail verdict with [`ComparisonReport::into_verdict`].

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::diagnostics::HarnessError;

const CHUNK_SIZE: usize = 64 * 1024;

/// A produced file whose content differs from its fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMismatch {
    /// Path relative to both roots.
    pub path: PathBuf,
    pub actual_len: u64,
    pub expected_len: u64,
    /// First differing byte. `None` when the sizes already differ.
    pub first_difference: Option<u64>,
}

impl FileMismatch {
    pub fn describe(&self) -> String {
        match self.first_difference {
            Some(offset) => format!("content differs at byte {}", offset),
            None => format!(
                "size differs ({} bytes produced, {} expected)",
                self.actual_len, self.expected_len
            ),
        }
    }
}

/// Outcome of comparing one produced tree with one expected tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonReport {
    pub actual_root: PathBuf,
    pub expected_root: PathBuf,
    pub matched: Vec<PathBuf>,
    pub mismatched: Vec<FileMismatch>,
    /// Produced files with no counterpart in the expected tree.
    pub missing: Vec<PathBuf>,
    /// Expected files the step never produced.
    pub unproduced: Vec<PathBuf>,
}

impl ComparisonReport {
    /// Number of produced files that were checked.
    pub fn checked(&self) -> usize {
        self.matched.len() + self.mismatched.len() + self.missing.len()
    }

    /// True when the step produced nothing although fixtures expect output.
    pub fn is_vacuous(&self) -> bool {
        self.checked() == 0 && !self.unproduced.is_empty()
    }

    pub fn passed(&self, strict: bool) -> bool {
        self.offences(strict).is_empty()
    }

    /// Every failing path with its reason, ordered by relative path.
    ///
    /// The returned paths are absolute: produced files are reported under the
    /// actual root, files only the fixtures have under the expected root.
    pub fn offences(&self, strict: bool) -> Vec<(PathBuf, String)> {
        let mut offences: Vec<(PathBuf, PathBuf, String)> = Vec::new();
        for m in &self.mismatched {
            offences.push((m.path.clone(), self.actual_root.join(&m.path), m.describe()));
        }
        for p in &self.missing {
            offences.push((
                p.clone(),
                self.actual_root.join(p),
                "no counterpart in the expected output".to_string(),
            ));
        }
        if strict || self.is_vacuous() {
            for p in &self.unproduced {
                offences.push((
                    p.clone(),
                    self.expected_root.join(p),
                    "expected file was not produced".to_string(),
                ));
            }
        }
        offences.sort_by(|a, b| a.0.cmp(&b.0));
        offences
            .into_iter()
            .map(|(_, path, reason)| (path, reason))
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} matched, {} mismatched, {} missing, {} unproduced",
            self.matched.len(),
            self.mismatched.len(),
            self.missing.len(),
            self.unproduced.len()
        )
    }

    /// Turns the report into the stage verdict; the error names the first
    /// offending path.
    pub fn into_verdict(self, stage: &str, strict: bool) -> Result<Self, HarnessError> {
        let offences = self.offences(strict);
        let Some((path, reason)) = offences.first().cloned() else {
            return Ok(self);
        };
        let reason = if self.is_vacuous() {
            format!("{} (the step produced no files)", reason)
        } else {
            reason
        };
        Err(HarnessError::Verification {
            stage: stage.to_string(),
            path,
            reason,
            summary: Some(format!(
                "{} offending path(s): {}",
                offences.len(),
                self.summary()
            )),
        })
    }
}

/// Compares every file under `actual_root` with the file at the same relative
/// path under `expected_root`. A missing `actual_root` counts as an empty tree.
pub fn compare_trees(actual_root: &Path, expected_root: &Path) -> Result<ComparisonReport, HarnessError> {
    let produced = list_files(actual_root)?;
    let expected = list_files(expected_root)?;

    let mut report = ComparisonReport {
        actual_root: actual_root.to_path_buf(),
        expected_root: expected_root.to_path_buf(),
        ..ComparisonReport::default()
    };

    for relative in &produced {
        if !expected.contains(relative) {
            report.missing.push(relative.clone());
            continue;
        }
        let actual = actual_root.join(relative);
        let wanted = expected_root.join(relative);
        match compare_files(&actual, &wanted)? {
            None => report.matched.push(relative.clone()),
            Some(mut mismatch) => {
                mismatch.path = relative.clone();
                report.mismatched.push(mismatch);
            }
        }
    }
    report.unproduced = expected.difference(&produced).cloned().collect();
    Ok(report)
}

/// Relative paths of all regular files below `root`, sorted.
pub fn list_files(root: &Path) -> Result<BTreeSet<PathBuf>, HarnessError> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
            HarnessError::io(path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.insert(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Compares two files by content. Returns `None` when identical.
pub fn compare_files(actual: &Path, expected: &Path) -> Result<Option<FileMismatch>, HarnessError> {
    let actual_len = fs::metadata(actual)
        .map_err(|e| HarnessError::io(actual, e))?
        .len();
    let expected_len = fs::metadata(expected)
        .map_err(|e| HarnessError::io(expected, e))?
        .len();
    let mismatch = |first_difference| FileMismatch {
        path: actual.to_path_buf(),
        actual_len,
        expected_len,
        first_difference,
    };
    if actual_len != expected_len {
        return Ok(Some(mismatch(None)));
    }

    let mut a = File::open(actual).map_err(|e| HarnessError::io(actual, e))?;
    let mut b = File::open(expected).map_err(|e| HarnessError::io(expected, e))?;
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];
    let mut offset = 0u64;
    loop {
        let n_a = fill(&mut a, &mut buf_a).map_err(|e| HarnessError::io(actual, e))?;
        let n_b = fill(&mut b, &mut buf_b).map_err(|e| HarnessError::io(expected, e))?;
        let common = n_a.min(n_b);
        if let Some(pos) = buf_a[..common]
            .iter()
            .zip(&buf_b[..common])
            .position(|(x, y)| x != y)
        {
            return Ok(Some(mismatch(Some(offset + pos as u64))));
        }
        if n_a != n_b {
            // The file changed size underneath us.
            return Ok(Some(mismatch(Some(offset + common as u64))));
        }
        if n_a == 0 {
            return Ok(None);
        }
        offset += n_a as u64;
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
