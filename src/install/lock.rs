//! Advisory lock on a server directory
//!
//! The lock is a file created with `create_new` inside the target, holding the
//! PID of the run that owns it. It is removed when the guard drops, including
//! on error paths.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Result, UpdateError};

/// File name of the lock inside the server directory.
pub const LOCK_FILE_NAME: &str = ".bedrock-updater.lock";

/// Held for the whole mutation phase of a run.
#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
}

impl TargetLock {
    /// Take the lock on `target`, failing with `TargetLocked` if another run holds it.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = target.join(LOCK_FILE_NAME);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default();
                debug!("Lock {} held by pid `{}`", path.display(), owner.trim());
                return Err(UpdateError::TargetLocked { path });
            }
            Err(e) => {
                return Err(UpdateError::extraction(&path, e));
            }
        };

        let lock = Self { path };
        writeln!(file, "{}", std::process::id())
            .map_err(|e| UpdateError::extraction(&lock.path, e))?;
        debug!("Acquired lock {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Could not remove lock file {}: {e}", self.path.display());
        }
    }
}
