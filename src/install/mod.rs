//! Bedrock server update and install workflow
//!
//! [`Installer`] drives the whole run; the components it sequences are public
//! so they can be used and tested on their own.

mod backup;
mod decision;
mod detection;
mod download;
mod environment;
mod lock;
mod merge;
mod orchestration;
mod preserve;
mod progress;
mod runners;
mod version;
mod wizard;

pub use backup::{BackupManager, host_identifier};
pub use decision::{Decision, Mode, decide};
pub use detection::VersionProbe;
pub use download::{
    ArchiveExtractor, DownloadLink, Downloader, Platform, ReleaseInfo, ReleaseResolver,
    StagingTree, extract_archive, select_release, version_from_url,
};
pub use environment::is_interactive;
pub use lock::{LOCK_FILE_NAME, TargetLock};
pub use merge::{merge_tree, merge_tree_blocking};
pub use orchestration::{Installer, Outcome, Plan, RunOptions, UpdateReport};
pub use preserve::{ConfigPreserver, PreserveScope, PreserveSpec};
pub use progress::{DownloadMetadata, InstallProgress, ProgressSink, Stage};
pub use runners::run_cli;
pub use version::{Channel, InstalledVersion, Version, VersionParseError};
