//! # Shared Test Fixtures
//!
//! Builds a small but realistic fixture bundle in memory: raw input archives
//! plus the reconstruction and merge output a correct implementation would
//! produce from them. The fake transformations below are that implementation.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use recon_harness::layout::{HarnessLayout, DEFAULT_INPUT_DIR};
use recon_harness::transform::ReconstructionRequest;
use recon_harness::{HarnessError, RangeSelector};

pub const LABEL: &str = "RECONSTRUCTOR";

/// Raw logger archives, keyed by file name.
pub const RAW_ARCHIVES: &[(&str, &str)] = &[
    (
        "bbob_f002_run1.txt",
        "% evals fitness\n1 10.5\n1 10.5\n2 8.25\n5 3.125\n",
    ),
    (
        "bbob_f010_run2.txt",
        "% evals fitness\n1 400.0\n3 120.0\n3 120.0\n3 120.0\n10 0.5\n",
    ),
];

// ============================================================================
// FAKE TRANSFORMATIONS
// ============================================================================

pub fn reference_request(fixture_root: &Path) -> ReconstructionRequest {
    ReconstructionRequest {
        input_dir: fixture_root.join(DEFAULT_INPUT_DIR),
        label: LABEL.to_string(),
        producer: "RECONSTRUCTOR".to_string(),
        comment: "A test for reconstruction of logger output".to_string(),
        records: RangeSelector::parse("1-55").unwrap(),
        runs: RangeSelector::parse("1-10").unwrap(),
        targets: RangeSelector::parse("2,3,5,10,20,40").unwrap(),
    }
}

pub fn reconstruct_text(request: &ReconstructionRequest, raw: &str) -> String {
    format!(
        "algorithm = '{}'\ncomment = '{}'\nrecords = {}\nruns = {}\ntargets = {}\n{}",
        request.producer, request.comment, request.records, request.runs, request.targets, raw
    )
}

/// Collapses consecutive duplicate lines.
pub fn merge_text(text: &str) -> String {
    let mut out = String::new();
    let mut last: Option<&str> = None;
    for line in text.lines() {
        if last != Some(line) {
            out.push_str(line);
            out.push('\n');
        }
        last = Some(line);
    }
    out
}

fn stem(name: &str) -> &str {
    name.trim_end_matches(".txt")
}

/// Reads every raw archive and writes `data/<stem>.info` and `data/<stem>.dat`.
pub fn fake_reconstruct(request: &ReconstructionRequest, output_dir: &Path) -> Result<(), HarnessError> {
    let data_dir = output_dir.join("data");
    fs::create_dir_all(&data_dir).map_err(|e| HarnessError::io(&data_dir, e))?;
    let entries = fs::read_dir(&request.input_dir).map_err(|e| HarnessError::io(&request.input_dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| HarnessError::io(&request.input_dir, e))?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let raw = fs::read_to_string(&path).map_err(|e| HarnessError::io(&path, e))?;
        fs::write(data_dir.join(format!("{}.info", stem(&name))), reconstruct_text(request, &raw))
            .map_err(|e| HarnessError::io(&data_dir, e))?;
        fs::write(data_dir.join(format!("{}.dat", stem(&name))), &raw)
            .map_err(|e| HarnessError::io(&data_dir, e))?;
    }
    Ok(())
}

/// Rewrites the copy of `source` in `dest_dir` with duplicates collapsed.
pub fn fake_merge(source: &Path, _context_dir: &Path, dest_dir: &Path) -> Result<(), HarnessError> {
    let copy = dest_dir.join(source.file_name().unwrap_or_default());
    let text = fs::read_to_string(&copy).map_err(|e| HarnessError::io(&copy, e))?;
    fs::write(&copy, merge_text(&text)).map_err(|e| HarnessError::io(&copy, e))
}

/// A reconstruction that succeeds without writing anything.
pub fn silent_reconstruct(_request: &ReconstructionRequest, _output_dir: &Path) -> Result<(), HarnessError> {
    Ok(())
}

// ============================================================================
// FIXTURE BUNDLES
// ============================================================================

/// Every file of a complete bundle, relative to the fixture root.
pub fn fixture_files(request: &ReconstructionRequest) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    for (name, raw) in RAW_ARCHIVES {
        let info = reconstruct_text(request, raw);
        files.push((format!("{}/{}", DEFAULT_INPUT_DIR, name), raw.as_bytes().to_vec()));
        files.push((
            format!("{}/data/{}.info", request.label, stem(name)),
            info.clone().into_bytes(),
        ));
        files.push((
            format!("{}/data/{}.dat", request.label, stem(name)),
            raw.as_bytes().to_vec(),
        ));
        files.push((
            format!("{}-merged/data/{}.info", request.label, stem(name)),
            merge_text(&info).into_bytes(),
        ));
    }
    files
}

pub fn write_files(root: &Path, files: &[(String, Vec<u8>)]) {
    for (relative, data) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

/// Every directory the bundle's files live in, `prefix` included, parents
/// before children.
pub fn archive_directories(prefix: &str, files: &[(String, Vec<u8>)]) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    dirs.insert(prefix.to_string());
    for (relative, _) in files {
        let mut current = Path::new(relative).parent();
        while let Some(dir) = current.filter(|d| !d.as_os_str().is_empty()) {
            dirs.insert(format!("{}/{}", prefix, dir.display()));
            current = dir.parent();
        }
    }
    dirs
}

/// Gzip-compressed tarball with every entry placed under `prefix/`. Like the
/// published bundle, files are read-only and directories are `r-x` only, and
/// each directory entry precedes its contents.
pub fn build_tgz(prefix: &str, files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for dir in archive_directories(prefix, files) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o555);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/", dir), io::empty())
            .unwrap();
    }
    for (relative, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o444);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", prefix, relative), data.as_slice())
            .unwrap();
    }
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

/// Number of entries `build_tgz` writes for `files`.
pub fn tgz_entry_count(prefix: &str, files: &[(String, Vec<u8>)]) -> usize {
    archive_directories(prefix, files).len() + files.len()
}

/// Root bypasses permission bits, so read-only cases only mean something for
/// ordinary users.
#[cfg(unix)]
pub fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;

    let marker = tempfile::NamedTempFile::new().unwrap();
    marker.as_file().metadata().unwrap().uid() == 0
}

/// A scratch directory with `exdata/` and `test-data/` roots beneath it.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn working_root(&self) -> PathBuf {
        self.dir.path().join("exdata")
    }

    pub fn fixture_root(&self) -> PathBuf {
        self.dir.path().join("test-data")
    }

    pub fn layout(&self) -> HarnessLayout {
        HarnessLayout::new(self.working_root(), self.fixture_root(), LABEL)
    }

    pub fn request(&self) -> ReconstructionRequest {
        reference_request(&self.fixture_root())
    }

    /// Writes a complete bundle straight to disk.
    pub fn seed_fixtures(&self) {
        write_files(&self.fixture_root(), &fixture_files(&self.request()));
    }

    /// Writes the reference bundle as `bundle.tgz` and returns its path.
    pub fn write_archive(&self) -> PathBuf {
        let path = self.dir.path().join("bundle.tgz");
        fs::write(&path, build_tgz("test-data", &fixture_files(&self.request()))).unwrap();
        path
    }
}
