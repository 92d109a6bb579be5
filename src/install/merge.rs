//! Recursive overwrite of the server directory from staging
//!
//! Not transactional: a failure leaves whatever was already copied in place
//! and is reported as `MergeFailed` with the backup location.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, UpdateError};

/// Copy every entry of `staging` over `target`, replacing what is there.
///
/// Paths only present in `target` are left alone. Returns the number of files
/// written.
pub fn merge_tree(staging: &Path, target: &Path, backup: Option<&Path>) -> Result<u64> {
    let fail = |path: &Path, source: io::Error| UpdateError::MergeFailed {
        path: path.to_path_buf(),
        backup: backup.map(Path::to_path_buf),
        source,
    };

    let mut written = 0u64;
    let walker = WalkDir::new(staging)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(staging).to_path_buf();
            fail(&path, io::Error::from(e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| fail(entry.path(), io::Error::other(e)))?;
        let dest = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            clear_non_dir(&dest).map_err(|e| fail(&dest, e))?;
            fs::create_dir_all(&dest).map_err(|e| fail(&dest, e))?;
        } else if file_type.is_symlink() {
            warn!("Skipping symbolic link {} from archive", relative.display());
        } else {
            clear_for_file(&dest).map_err(|e| fail(&dest, e))?;
            fs::copy(entry.path(), &dest).map_err(|e| fail(&dest, e))?;
            debug!("Updated {}", relative.display());
            written += 1;
        }
    }

    info!("Merged {written} files into {}", target.display());
    Ok(written)
}

/// Async wrapper running the merge on the blocking pool.
pub async fn merge_tree_blocking(
    staging: &Path,
    target: &Path,
    backup: Option<&Path>,
) -> Result<u64> {
    let staging = staging.to_path_buf();
    let target = target.to_path_buf();
    let backup: Option<PathBuf> = backup.map(Path::to_path_buf);
    let join_target = target.clone();
    let join_backup = backup.clone();

    tokio::task::spawn_blocking(move || merge_tree(&staging, &target, backup.as_deref()))
        .await
        .map_err(|e| UpdateError::MergeFailed {
            path: join_target,
            backup: join_backup,
            source: io::Error::other(e),
        })?
}

/// A directory is about to be created at `path`: drop a file or link in the way.
fn clear_non_dir(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A file is about to be written at `path`: drop a directory or link in the
/// way so the copy never writes through a link.
fn clear_for_file(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
