//! Installed version detection
//!
//! Determines which Bedrock server build is deployed in a directory by
//! reading version metadata:
//! - the updater's own metadata file (written after every successful merge)
//! - fallback files shipped or left behind by other tools (`version.txt`,
//!   `CHANGES.txt`), scanned for a four-part version number
//!
//! A missing or unreadable file never fails a run; it only means the
//! version is unknown and the run behaves as a first install.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::version::{Channel, InstalledVersion, Version};
use crate::config::VersionConfig;

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").expect("static version regex"));

static CHANNEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*channel\s*[:=]\s*(\w+)\s*$").expect("static channel regex"));

/// Reads and writes the version metadata of a server directory.
#[derive(Debug, Clone)]
pub struct VersionProbe {
    metadata_file: String,
    fallback_files: Vec<String>,
}

impl VersionProbe {
    pub fn new(config: &VersionConfig) -> Self {
        Self {
            metadata_file: config.metadata_file.clone(),
            fallback_files: config.fallback_files.clone(),
        }
    }

    pub fn metadata_path(&self, target_dir: &Path) -> PathBuf {
        target_dir.join(&self.metadata_file)
    }

    /// Detect the installed version, or `None` for a fresh directory.
    pub fn read(&self, target_dir: &Path) -> Option<InstalledVersion> {
        std::iter::once(&self.metadata_file)
            .chain(self.fallback_files.iter())
            .find_map(|name| read_version_file(&target_dir.join(name)))
    }

    /// Record `installed` as the deployed version.
    ///
    /// Only called after a successful merge; the caller reports a failure
    /// here without undoing the merge.
    pub fn write(&self, target_dir: &Path, installed: &InstalledVersion) -> std::io::Result<PathBuf> {
        let path = self.metadata_path(target_dir);
        let content = format!(
            "Bedrock Server {}\nchannel: {}\n",
            installed.version, installed.channel
        );
        fs::write(&path, content)?;
        Ok(path)
    }
}

fn read_version_file(path: &Path) -> Option<InstalledVersion> {
    if !path.is_file() {
        return None;
    }

    let content = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Cannot read version metadata {}: {e}", path.display());
            return None;
        }
    };

    let Some(found) = VERSION_PATTERN.find(&content) else {
        debug!("No version number in {}", path.display());
        return None;
    };
    let version: Version = match found.as_str().parse() {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring version metadata {}: {e}", path.display());
            return None;
        }
    };

    let channel = CHANNEL_PATTERN
        .captures(&content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<Channel>().ok())
        .unwrap_or_default();

    debug!("Detected version {version} ({channel}) from {}", path.display());
    Some(InstalledVersion { version, channel })
}
