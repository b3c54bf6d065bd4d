//! # Teardown
//!
//! Removal of the directory trees a run owns. Removal is deepest-first, an
//! already-absent tree counts as clean, and entries that refuse removal for
//! lack of permission get only the blocking write bit relaxed before a single
//! retry.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::diagnostics::HarnessError;
use crate::layout::HarnessLayout;

/// What a removal actually deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    pub files: usize,
    pub dirs: usize,
}

impl RemovalStats {
    pub fn is_empty(&self) -> bool {
        self.files == 0 && self.dirs == 0
    }

    fn absorb(&mut self, other: RemovalStats) {
        self.files += other.files;
        self.dirs += other.dirs;
    }
}

/// Removes `root` and everything beneath it.
///
/// A missing `root` is not an error. A `root` that exists but is not a
/// directory is a teardown inconsistency.
pub fn remove_tree(root: &Path) -> Result<RemovalStats, HarnessError> {
    let meta = match fs::symlink_metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RemovalStats::default()),
        Err(e) => return Err(HarnessError::io(root, e)),
    };
    if !meta.is_dir() {
        return Err(HarnessError::teardown(
            root,
            "expected a directory tree, found a file",
        ));
    }

    let mut stats = RemovalStats::default();
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                continue
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(HarnessError::Teardown {
                    path,
                    message: "failed to walk directory".to_string(),
                    source: e.into_io_error(),
                });
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().is_dir();
        match remove_entry(path, is_dir) {
            Ok(true) if is_dir => stats.dirs += 1,
            Ok(true) => stats.files += 1,
            Ok(false) => {}
            Err(e) => {
                return Err(HarnessError::Teardown {
                    path: path.to_path_buf(),
                    message: format!("could not remove {}", if is_dir { "directory" } else { "file" }),
                    source: Some(e),
                })
            }
        }
    }
    Ok(stats)
}

/// Returns `Ok(false)` when the entry had already vanished.
fn remove_entry(path: &Path, is_dir: bool) -> io::Result<bool> {
    match remove_once(path, is_dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            relax_for_removal(path)?;
            remove_once(path, is_dir).map(|_| true)
        }
        Err(e) => Err(e),
    }
}

fn remove_once(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Unlinking needs write access on the parent directory; some platforms also
/// refuse to delete a read-only entry itself.
fn relax_for_removal(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        make_owner_writable(parent)?;
    }
    make_owner_writable(path)
}

/// Adds the owner-write bit, leaving every other permission bit alone.
pub(crate) fn make_owner_writable(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        if mode & 0o200 != 0 {
            return Ok(());
        }
        perms.set_mode(mode | 0o200);
    }
    #[cfg(not(unix))]
    {
        if !perms.readonly() {
            return Ok(());
        }
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)
}

/// Removes the run's working root and, when `full_reset` is set, the fixture
/// bundle as well.
pub fn cleanup(layout: &HarnessLayout, full_reset: bool) -> Result<RemovalStats, HarnessError> {
    let mut stats = remove_tree(layout.working_root())?;
    if full_reset {
        stats.absorb(remove_tree(layout.fixture_root())?);
    }
    Ok(stats)
}
