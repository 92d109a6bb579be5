//! Platform detection for download variant selection

use std::fmt;

use log::warn;
use once_cell::sync::OnceCell;

use crate::error::{Result, UpdateError};
use crate::install::version::Channel;

/// Operating systems the vendor publishes Bedrock server builds for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
}

/// Global cache for platform detection (initialized once, used everywhere)
static PLATFORM_CACHE: OnceCell<Platform> = OnceCell::new();

impl Platform {
    /// Detect current platform (cached after first call)
    pub fn detect() -> Result<Self> {
        PLATFORM_CACHE
            .get_or_try_init(|| Self::from_os(std::env::consts::OS, std::env::consts::ARCH))
            .copied()
    }

    fn from_os(os: &str, arch: &str) -> Result<Self> {
        let platform = match os {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            other => {
                return Err(UpdateError::UnsupportedPlatform(format!(
                    "no Bedrock server builds are published for {other}"
                )));
            }
        };

        // Builds are x86_64 only; emulation layers may still run them.
        if arch != "x86_64" {
            warn!("Bedrock server builds target x86_64, this host is {arch}");
        }

        Ok(platform)
    }

    /// The vendor's `downloadType` label for this platform and channel.
    pub fn download_type(&self, channel: Channel) -> &'static str {
        match (self, channel) {
            (Platform::Windows, Channel::Release) => "serverBedrockWindows",
            (Platform::Windows, Channel::Preview) => "serverBedrockPreviewWindows",
            (Platform::Linux, Channel::Release) => "serverBedrockLinux",
            (Platform::Linux, Channel::Preview) => "serverBedrockPreviewLinux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
        })
    }
}
