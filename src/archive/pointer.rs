//! The `latest` pointer in the output root.

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{ArchiveError, Result};

pub const LATEST_POINTER: &str = "latest";
const LOCK_FILE: &str = ".latest.lock";

/// Point `<output_root>/latest` at `<output_root>/<run_id>`.
///
/// Holds an exclusive advisory lock on `<output_root>/.latest.lock` while
/// swapping so concurrent processes sharing an output root cannot interleave.
/// A pointer that already targets `run_id` is left alone. Otherwise a fresh
/// link is renamed over the old one; if that fails the old entry is removed
/// and the rename retried once.
pub fn publish_latest(output_root: &Path, run_id: &str) -> Result<PathBuf> {
    let latest = output_root.join(LATEST_POINTER);
    let lock_path = output_root.join(LOCK_FILE);
    let lock = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| ArchiveError::pointer_swap(&latest, format!("open lock: {e}")))?;
    lock.lock_exclusive()
        .map_err(|e| ArchiveError::pointer_swap(&latest, format!("lock: {e}")))?;

    let target = Path::new(run_id);
    if fs::read_link(&latest).ok().as_deref() == Some(target) {
        debug!(pointer = %latest.display(), run_id, "latest pointer already current");
        return Ok(latest);
    }

    let staged = output_root.join(format!(".{LATEST_POINTER}.{}.tmp", std::process::id()));
    let _ = fs::remove_file(&staged);
    link_dir(target, &staged)
        .map_err(|e| ArchiveError::pointer_swap(&latest, format!("create link: {e}")))?;

    if fs::rename(&staged, &latest).is_err() {
        let swapped = remove_existing(&latest).and_then(|_| fs::rename(&staged, &latest));
        if let Err(err) = swapped {
            let _ = fs::remove_file(&staged);
            return Err(ArchiveError::pointer_swap(&latest, err.to_string()));
        }
    }

    debug!(pointer = %latest.display(), run_id, "latest pointer updated");
    Ok(latest)
}

/// Remove an existing pointer. Real directories are never deleted.
fn remove_existing(latest: &Path) -> io::Result<()> {
    match fs::symlink_metadata(latest) {
        Ok(meta) if meta.file_type().is_symlink() => remove_link(latest),
        Ok(meta) if meta.file_type().is_dir() => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "exists and is a real directory, not a link",
        )),
        Ok(_) => fs::remove_file(latest),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn remove_link(link: &Path) -> io::Result<()> {
    fs::remove_file(link)
}

/// Directory symlinks are directories to Windows and need `remove_dir`.
#[cfg(windows)]
fn remove_link(link: &Path) -> io::Result<()> {
    fs::remove_dir(link).or_else(|_| fs::remove_file(link))
}

#[cfg(unix)]
fn link_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn link_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
