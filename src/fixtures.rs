//! # Fixture Acquisition
//!
//! Makes sure the fixture bundle (input archives plus expected outputs) is
//! present under the fixture root. A complete bundle is reused untouched; an
//! incomplete one is wiped and fetched again from its [`ArchiveSource`],
//! unpacked, and made deletable. Acquisition is single-shot: any failure is
//! returned as [`HarnessError::Acquisition`] and nothing is retried.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::diagnostics::HarnessError;
use crate::layout::HarnessLayout;
use crate::teardown;

pub const DEFAULT_FIXTURE_URL: &str =
    "http://dis.ijs.si/tea/tmp/log-reconstruction-test-data.tgz";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// ARCHIVE SOURCES
// ============================================================================

/// Somewhere a compressed fixture archive can be read from.
pub trait ArchiveSource {
    /// Human-readable origin, used in progress output and errors.
    fn describe(&self) -> String;

    /// Returns the raw `.tgz` bytes.
    fn fetch(&self) -> Result<Vec<u8>, HarnessError>;
}

/// Downloads the archive with a single blocking HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpArchive {
    url: String,
    timeout: Duration,
}

impl HttpArchive {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ArchiveSource for HttpArchive {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<Vec<u8>, HarnessError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("recon-harness/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(|e| HarnessError::acquisition_with("could not create HTTP client", e))?;

        let response = client
            .get(&self.url)
            .send()
            .map_err(|e| HarnessError::acquisition_with(format!("GET {} failed", self.url), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarnessError::acquisition(format!(
                "GET {} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }

        let body = response.bytes().map_err(|e| {
            HarnessError::acquisition_with(format!("reading body of {} failed", self.url), e)
        })?;
        Ok(body.to_vec())
    }
}

/// An archive that is already on disk.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    path: PathBuf,
}

impl LocalArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArchiveSource for LocalArchive {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Vec<u8>, HarnessError> {
        fs::read(&self.path).map_err(|e| {
            HarnessError::acquisition_with(format!("cannot read {}", self.path.display()), e)
        })
    }
}

// ============================================================================
// ACQUISITION
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Hex SHA-256 the archive must have, if pinned.
    pub expected_sha256: Option<String>,
    /// Re-download even when the bundle looks complete.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// A complete bundle was already present; nothing was fetched.
    Reused,
    Downloaded {
        sha256: String,
        bytes: u64,
        entries: usize,
    },
}

/// A bundle is complete when both the input archives and the expected
/// reconstruction output are present.
pub fn bundle_is_complete(layout: &HarnessLayout) -> bool {
    layout.input_dir().is_dir() && layout.expected_dir().is_dir()
}

/// Ensures the fixture bundle for `layout` exists locally.
pub fn acquire(
    layout: &HarnessLayout,
    source: &dyn ArchiveSource,
    options: &AcquireOptions,
) -> Result<Acquisition, HarnessError> {
    if !options.force && bundle_is_complete(layout) {
        return Ok(Acquisition::Reused);
    }

    // A partial bundle cannot be trusted; start from nothing.
    teardown::remove_tree(layout.fixture_root())?;

    let bytes = source.fetch()?;
    let sha256 = sha256_hex(&bytes);
    if let Some(expected) = &options.expected_sha256 {
        if !expected.trim().eq_ignore_ascii_case(&sha256) {
            return Err(HarnessError::acquisition(format!(
                "archive from {} has SHA-256 {}, expected {}",
                source.describe(),
                sha256,
                expected.trim()
            )));
        }
    }

    let extract_root = layout.extract_root();
    fs::create_dir_all(&extract_root).map_err(|e| HarnessError::io(&extract_root, e))?;
    let entries = unpack(&bytes, &extract_root)?;
    normalize_permissions(layout.fixture_root())?;

    if !bundle_is_complete(layout) {
        return Err(HarnessError::acquisition(format!(
            "archive from {} did not provide {} and {}",
            source.describe(),
            layout.input_dir().display(),
            layout.expected_dir().display()
        )));
    }

    Ok(Acquisition::Downloaded {
        sha256,
        bytes: bytes.len() as u64,
        entries,
    })
}

/// Unpacks a gzip-compressed tarball below `dest`, returning the entry count.
/// Entries whose paths would land outside `dest` are rejected.
///
/// Directory entries are applied last, deepest first, so a read-only
/// directory mode never blocks the files that belong inside it.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<usize, HarnessError> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| HarnessError::acquisition_with("archive is not a readable tarball", e))?;

    let mut count = 0;
    let mut directories = Vec::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| HarnessError::acquisition_with("corrupt archive entry", e))?;
        if entry.header().entry_type().is_dir() {
            directories.push(entry);
            continue;
        }
        unpack_entry(&mut entry, dest)?;
        count += 1;
    }

    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for mut directory in directories {
        unpack_entry(&mut directory, dest)?;
        count += 1;
    }
    Ok(count)
}

fn unpack_entry<R: Read>(entry: &mut tar::Entry<'_, R>, dest: &Path) -> Result<(), HarnessError> {
    let name = entry
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "<unnamed>".to_string());
    let unpacked = entry
        .unpack_in(dest)
        .map_err(|e| HarnessError::acquisition_with(format!("cannot unpack {}", name), e))?;
    if !unpacked {
        return Err(HarnessError::acquisition(format!(
            "archive entry {} escapes {}",
            name,
            dest.display()
        )));
    }
    Ok(())
}

/// Gives the owner write access to every read-only entry so teardown can
/// later remove the bundle.
pub fn normalize_permissions(root: &Path) -> Result<(), HarnessError> {
    if !root.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            HarnessError::acquisition_with(format!("cannot walk {}", root.display()), e)
        })?;
        teardown::make_owner_writable(entry.path())
            .map_err(|e| HarnessError::io(entry.path(), e))?;
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
