//! Output committer
//!
//! Generated files are written into a staging directory next to the target
//! and only swapped into place once every file has been written. A failed
//! run leaves the previous output untouched.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::NoormError;

/// Handle for writing files into the staging directory
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl Staging {
    /// Write `contents` to `path`, relative to the output directory
    pub fn write(&mut self, path: &Path, contents: &str) -> Result<(), NoormError> {
        if path.is_absolute() || path.components().any(|c| c.as_os_str() == "..") {
            return Err(NoormError::Output(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Refusing to write outside the output directory: {}", path.display()),
            )));
        }

        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&full_path, contents)?;
        debug!(path = ?path, "Staged file");
        self.files.push(path.to_path_buf());
        Ok(())
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub target: PathBuf,
    pub files: Vec<PathBuf>,
    /// Whether a previous output directory was replaced
    pub replaced: bool,
}

/// Stage everything `generate` writes and swap it into `target`
///
/// If `generate` fails, the staging directory is removed and `target` is
/// left as it was.
pub fn commit<F>(target: &Path, generate: F) -> Result<CommitSummary, NoormError>
where
    F: FnOnce(&mut Staging) -> Result<(), NoormError>,
{
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let staging_dir = tempfile::Builder::new()
        .prefix(".noorm-staging-")
        .tempdir_in(&parent)?;
    debug!(path = ?staging_dir.path(), "Created staging directory");

    let mut staging = Staging {
        root: staging_dir.path().to_path_buf(),
        files: Vec::new(),
    };

    // dropping the TempDir on error removes everything staged so far
    if let Err(e) = generate(&mut staging) {
        error!(error = ?e, "Generation failed, discarding staged output");
        return Err(e);
    }

    let staged = staging_dir.keep();
    let replaced = match swap_into_place(&staged, target, &parent) {
        Ok(replaced) => replaced,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staged) {
                warn!(path = ?staged, error = ?cleanup, "Failed to remove staging directory");
            }
            return Err(e);
        }
    };

    info!(target = ?target, files = staging.files.len(), "Output committed");
    Ok(CommitSummary {
        target: target.to_path_buf(),
        files: staging.files,
        replaced,
    })
}

/// Move `staged` to `target`, returning whether an old target was replaced
fn swap_into_place(staged: &Path, target: &Path, parent: &Path) -> Result<bool, NoormError> {
    if !target.exists() {
        fs::rename(staged, target)?;
        return Ok(false);
    }

    let backup = tempfile::Builder::new()
        .prefix(".noorm-previous-")
        .tempdir_in(parent)?;
    let backup_path = backup.path().join("output");

    fs::rename(target, &backup_path)?;
    if let Err(e) = fs::rename(staged, target) {
        error!(error = ?e, "Failed to move new output into place, restoring previous output");
        if let Err(restore) = fs::rename(&backup_path, target) {
            error!(error = ?restore, backup = ?backup_path, "Failed to restore previous output");
            // keep the backup around for manual recovery
            let _ = backup.keep();
        }
        return Err(e.into());
    }

    // dropping the TempDir removes the previous output
    drop(backup);
    Ok(true)
}
