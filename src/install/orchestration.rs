//! Update workflow orchestration
//!
//! The workflow is split in two so a caller can ask for confirmation in
//! between: [`Installer::plan`] probes, resolves and decides without touching
//! anything, [`Installer::apply`] performs the mutating steps. Any failure
//! before the backup completes leaves the server directory untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio::sync::mpsc;

use super::backup::{BackupManager, host_identifier};
use super::decision::{Decision, Mode, decide};
use super::detection::VersionProbe;
use super::download::{ArchiveExtractor, Downloader, Platform, ReleaseInfo, ReleaseResolver};
use super::lock::{LOCK_FILE_NAME, TargetLock};
use super::merge::merge_tree_blocking;
use super::preserve::{ConfigPreserver, PreserveScope, PreserveSpec};
use super::progress::{InstallProgress, ProgressSink, Stage};
use super::version::{Channel, InstalledVersion};
use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError};

/// Per-run options, usually straight from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target_dir: PathBuf,
    pub channel: Channel,
    pub force: bool,
    pub check_only: bool,
    pub mode: Mode,
}

impl RunOptions {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            channel: Channel::Release,
            force: false,
            check_only: false,
            mode: Mode::Update,
        }
    }
}

/// Result of the read-only phase.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Absolute server directory.
    pub target_dir: PathBuf,
    pub mode: Mode,
    pub installed: Option<InstalledVersion>,
    pub release: ReleaseInfo,
    pub decision: Decision,
}

/// What a successful apply did.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub target_dir: PathBuf,
    pub release: ReleaseInfo,
    pub previous: Option<InstalledVersion>,
    /// `None` when the directory was empty and nothing needed saving.
    pub backup: Option<PathBuf>,
    pub files_written: u64,
    /// Paths kept from the existing installation.
    pub preserved: Vec<PathBuf>,
    /// False when the merge succeeded but the version file could not be written.
    pub metadata_written: bool,
}

/// How a full [`Installer::run`] ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    CheckOnly(Plan),
    Skipped(Plan),
    Applied(UpdateReport),
}

/// Sequences probe, resolve, download, extract, preserve, backup and merge.
pub struct Installer {
    config: UpdaterConfig,
    platform: Platform,
    progress: ProgressSink,
    host: String,
}

impl Installer {
    /// Installer for the platform this process runs on.
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        let platform = Platform::detect()?;
        Ok(Self::with_platform(config, platform))
    }

    pub fn with_platform(config: UpdaterConfig, platform: Platform) -> Self {
        Self {
            config,
            platform,
            progress: ProgressSink::default(),
            host: host_identifier(),
        }
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: mpsc::Sender<InstallProgress>) -> Self {
        self.progress = ProgressSink::new(tx);
        self
    }

    /// Override the host name used in backup directory names.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Probe, resolve and decide. Never writes anything.
    pub async fn plan(&self, options: &RunOptions) -> Result<Plan> {
        let target_dir = absolute_target(&options.target_dir)?;

        self.progress.stage(Stage::Probe, "Reading installed version");
        let installed = VersionProbe::new(&self.config.version).read(&target_dir);
        match &installed {
            Some(current) => info!("Installed version: {current}"),
            None => info!("No installed version found in {}", target_dir.display()),
        }

        self.progress.stage(
            Stage::Resolve,
            format!("Looking up latest {} build for {}", options.channel, self.platform),
        );
        let resolver = ReleaseResolver::new(&self.config.api, &self.config.download)?;
        let release = resolver.resolve(options.channel, self.platform).await?;
        info!("Latest {} build: {}", release.channel, release.version);

        let decision = decide(installed.as_ref(), &release, options.mode, options.force);
        info!("Decision: {decision}");

        Ok(Plan {
            target_dir,
            mode: options.mode,
            installed,
            release,
            decision,
        })
    }

    /// Perform the mutating phase for `plan`, whatever its decision says.
    pub async fn apply(&self, plan: &Plan) -> Result<UpdateReport> {
        let target = plan.target_dir.as_path();
        let release = &plan.release;

        fs::create_dir_all(target).map_err(|e| UpdateError::extraction(target, e))?;
        let _lock = TargetLock::acquire(target)?;

        // Archive and staging tree; removed on every exit path
        let work_root = self
            .config
            .download
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let work = tempfile::Builder::new()
            .prefix("bedrock-updater-")
            .tempdir_in(&work_root)
            .map_err(|e| UpdateError::extraction(&work_root, e))?;

        self.progress.stage(
            Stage::Download,
            format!("Downloading {}", release.archive_name()),
        );
        let downloader = Downloader::new(&self.config.download, self.progress.clone())?;
        let archive = downloader
            .fetch(
                &release.download_url,
                work.path(),
                &release.archive_name(),
                release.checksum.as_deref(),
            )
            .await?;

        self.progress.stage(Stage::Extract, "Extracting archive");
        let staging = ArchiveExtractor.extract(&archive, work.path()).await?;

        self.progress.stage(Stage::Preserve, "Keeping configuration and worlds");
        // Nothing installed means nothing to keep; the archive defaults go in
        let scope = match (plan.mode, &plan.installed) {
            (Mode::Update, Some(_)) => PreserveScope::All,
            _ => PreserveScope::ExistingInTarget,
        };
        let preserver = ConfigPreserver::new(PreserveSpec::from_config(&self.config.files));
        let preserved = preserver.apply_scoped(staging.root(), target, scope)?;

        let backup = if holds_only_lock(target).map_err(|e| UpdateError::backup(target, e))? {
            info!("{} is empty, skipping backup", target.display());
            None
        } else {
            self.progress.stage(Stage::Backup, "Backing up server directory");
            let manager = BackupManager::new(&self.config.backup)?;
            Some(
                manager
                    .snapshot_blocking(target, &release.version, &self.host)
                    .await?,
            )
        };

        self.progress.stage(Stage::Merge, "Installing new files");
        let files_written = merge_tree_blocking(staging.root(), target, backup.as_deref()).await?;

        self.progress.stage(Stage::WriteVersion, "Recording installed version");
        let installed = InstalledVersion {
            version: release.version.clone(),
            channel: release.channel,
        };
        let metadata_written = match VersionProbe::new(&self.config.version).write(target, &installed)
        {
            Ok(path) => {
                info!("Recorded {installed} in {}", path.display());
                true
            }
            Err(e) => {
                warn!("Update applied but the version file could not be written: {e}");
                false
            }
        };

        drop(staging);
        if let Err(e) = work.close() {
            warn!("Could not remove temporary files: {e}");
        }

        Ok(UpdateReport {
            target_dir: target.to_path_buf(),
            release: release.clone(),
            previous: plan.installed.clone(),
            backup,
            files_written,
            preserved,
            metadata_written,
        })
    }

    /// Plan and, when the decision allows it, apply. No confirmation step.
    pub async fn run(&self, options: &RunOptions) -> Result<Outcome> {
        let plan = self.plan(options).await?;

        if options.check_only {
            return Ok(Outcome::CheckOnly(plan));
        }
        if !plan.decision.proceeds() {
            return Ok(Outcome::Skipped(plan));
        }

        self.apply(&plan).await.map(Outcome::Applied)
    }
}

fn absolute_target(dir: &Path) -> Result<PathBuf> {
    let resolved = if dir.exists() {
        dir.canonicalize()
    } else {
        std::path::absolute(dir)
    };
    resolved.map_err(|e| UpdateError::extraction(dir, e))
}

/// True when the directory holds nothing besides our own lock file.
fn holds_only_lock(dir: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        if entry?.file_name() != LOCK_FILE_NAME {
            return Ok(false);
        }
    }
    Ok(true)
}
