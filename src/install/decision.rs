//! Skip-or-proceed decision between the installed and the resolved build

use std::fmt;

use log::warn;

use super::download::ReleaseInfo;
use super::version::{InstalledVersion, Version};

/// How the run was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Bring an existing installation up to date.
    #[default]
    Update,
    /// Explicit fresh install (`--install`).
    Install,
}

/// Outcome of comparing the installed build with the resolved one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing installed yet.
    FreshInstall,
    /// A newer build is available.
    Update { from: Version },
    /// `--force` bypassed the version check.
    Forced,
    /// The installed build is the same or newer.
    UpToDate { current: Version },
    /// `--install` against a directory that already has a server.
    AlreadyInstalled { current: Version },
}

impl Decision {
    /// Whether the mutating phase should run.
    pub fn proceeds(&self) -> bool {
        matches!(
            self,
            Decision::FreshInstall | Decision::Update { .. } | Decision::Forced
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::FreshInstall => write!(f, "no installation found, installing"),
            Decision::Update { from } => write!(f, "update available (installed {from})"),
            Decision::Forced => write!(f, "forced"),
            Decision::UpToDate { current } => write!(f, "up to date ({current})"),
            Decision::AlreadyInstalled { current } => {
                write!(f, "already installed ({current}), use --force to reinstall")
            }
        }
    }
}

/// Decide whether to apply `release` over what is `installed`.
pub fn decide(
    installed: Option<&InstalledVersion>,
    release: &ReleaseInfo,
    mode: Mode,
    force: bool,
) -> Decision {
    if let Some(current) = installed
        && current.channel != release.channel
    {
        warn!(
            "Installed build is on the {} channel, updating from {}",
            current.channel, release.channel
        );
    }

    if force {
        return Decision::Forced;
    }

    match (installed, mode) {
        (None, _) => Decision::FreshInstall,
        (Some(current), Mode::Install) => Decision::AlreadyInstalled {
            current: current.version.clone(),
        },
        (Some(current), Mode::Update) if release.version > current.version => Decision::Update {
            from: current.version.clone(),
        },
        (Some(current), Mode::Update) => Decision::UpToDate {
            current: current.version.clone(),
        },
    }
}
