//! Failure taxonomy for an update run
//!
//! Every step of the workflow returns [`UpdateError`] so callers can branch on
//! the kind of failure instead of its message. Each kind has its own process
//! exit status.

use std::io;
use std::path::PathBuf;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors that can end an update or install run.
#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    /// The vendor download API could not be reached or returned garbage.
    #[error("vendor API unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The vendor catalogue has no entry for the requested platform/channel.
    #[error("no download of type `{download_type}` in the vendor catalogue")]
    NoMatchingVariant { download_type: String },

    /// The host operating system has no Bedrock server build.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The archive could not be fetched within the retry budget.
    #[error("download failed: {reason}")]
    DownloadFailed { reason: String },

    /// The archive is malformed or contains an entry escaping the staging root.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// Writing the extracted tree failed (disk full, permissions, ...).
    #[error("extraction failed at {}: {source}", path.display())]
    ExtractionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The pre-update snapshot could not be completed. The target is untouched.
    #[error("backup to {} failed: {reason}", path.display())]
    BackupFailed { path: PathBuf, reason: String },

    /// Copying the new files over the target failed part way through.
    #[error("merge failed at {}: {source}", path.display())]
    MergeFailed {
        path: PathBuf,
        backup: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    /// The configuration file is unreadable or holds invalid values.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Another run holds the advisory lock on the target directory.
    #[error(
        "{} is locked by another run (remove the lock file if no update is in progress)",
        path.display()
    )]
    TargetLocked { path: PathBuf },
}

impl UpdateError {
    /// Process exit status for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            UpdateError::ConfigInvalid(_) => 2,
            UpdateError::UpstreamUnavailable(_) => 3,
            UpdateError::NoMatchingVariant { .. } => 4,
            UpdateError::DownloadFailed { .. } => 5,
            UpdateError::CorruptArchive(_) => 6,
            UpdateError::ExtractionFailed { .. } => 7,
            UpdateError::BackupFailed { .. } => 8,
            UpdateError::MergeFailed { .. } => 9,
            UpdateError::TargetLocked { .. } => 10,
            UpdateError::UnsupportedPlatform(_) => 11,
        }
    }

    /// Whether the target may be left half-updated and needs an operator.
    pub fn is_partial_update(&self) -> bool {
        matches!(self, UpdateError::MergeFailed { .. })
    }

    /// Manual recovery instructions for a partial update.
    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            UpdateError::MergeFailed {
                backup: Some(backup),
                ..
            } => Some(format!(
                "The server directory may be partially updated. Restore it from the backup at {}",
                backup.display()
            )),
            UpdateError::MergeFailed { backup: None, .. } => Some(
                "The server directory may be partially updated and no backup was taken (the target was empty)."
                    .to_string(),
            ),
            _ => None,
        }
    }

    pub(crate) fn download(reason: impl Into<String>) -> Self {
        UpdateError::DownloadFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn backup(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        UpdateError::BackupFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn extraction(path: impl Into<PathBuf>, source: io::Error) -> Self {
        UpdateError::ExtractionFailed {
            path: path.into(),
            source,
        }
    }
}
