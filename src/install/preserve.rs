//! Keep user configuration and worlds out of the merge
//!
//! Preservation is subtractive on the staging tree: a preserved path is
//! deleted from staging, so the merge never proposes a replacement for it and
//! the live copy in the server directory is simply left alone.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::FilesConfig;
use crate::error::{Result, UpdateError};

/// Relative paths excluded from overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreserveSpec {
    pub files: BTreeSet<PathBuf>,
    pub dirs: BTreeSet<PathBuf>,
}

impl PreserveSpec {
    pub fn from_config(config: &FilesConfig) -> Self {
        let clean = |entries: &[String]| {
            entries
                .iter()
                .map(|e| e.trim())
                .filter(|e| !e.is_empty() && !e.starts_with('#'))
                .map(PathBuf::from)
                .collect::<BTreeSet<_>>()
        };
        Self {
            files: clean(&config.exclude_files),
            dirs: clean(&config.exclude_dirs),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

/// Which preserve entries apply to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreserveScope {
    /// Every listed path is kept from the live installation.
    All,
    /// Only listed paths that already exist in the target are kept, so a
    /// fresh directory receives the vendor's default configuration.
    ExistingInTarget,
}

/// Removes preserved paths from a staging tree.
#[derive(Debug, Clone)]
pub struct ConfigPreserver {
    spec: PreserveSpec,
}

impl ConfigPreserver {
    pub fn new(spec: PreserveSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &PreserveSpec {
        &self.spec
    }

    /// Remove every preserved path from `staging`. `target` is never modified.
    ///
    /// Entries missing from staging are ignored. Returns the removed paths.
    pub fn apply(&self, staging: &Path, target: &Path) -> Result<Vec<PathBuf>> {
        self.apply_scoped(staging, target, PreserveScope::All)
    }

    /// Like [`apply`](Self::apply), limited to entries present in `target`.
    pub fn apply_existing(&self, staging: &Path, target: &Path) -> Result<Vec<PathBuf>> {
        self.apply_scoped(staging, target, PreserveScope::ExistingInTarget)
    }

    pub fn apply_scoped(
        &self,
        staging: &Path,
        target: &Path,
        scope: PreserveScope,
    ) -> Result<Vec<PathBuf>> {
        let wanted = |relative: &Path| match scope {
            PreserveScope::All => true,
            PreserveScope::ExistingInTarget => target.join(relative).exists(),
        };

        let mut removed = Vec::new();
        let listed = self.spec.dirs.iter().chain(&self.spec.files);

        // Listed as file or folder, whatever the archive holds at that path goes
        for relative in listed.filter(|p| wanted(p)) {
            let path = staging.join(relative);
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Preserved path {} not in archive", relative.display());
                    continue;
                }
                Err(e) => return Err(UpdateError::extraction(&path, e)),
            };

            if meta.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| UpdateError::extraction(&path, e))?;
                info!("Keeping existing folder {}", relative.display());
            } else {
                fs::remove_file(&path).map_err(|e| UpdateError::extraction(&path, e))?;
                info!("Keeping existing file {}", relative.display());
            }
            removed.push(relative.clone());
        }

        Ok(removed)
    }
}
