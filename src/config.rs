use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};

/// Name of the per-server configuration file looked up in the target directory.
pub const SERVER_CONFIG_FILE: &str = "update_config.toml";

/// Top‑level updater configuration. Read once per run and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdaterConfig {
    pub api: ApiConfig,
    pub download: DownloadConfig,
    pub files: FilesConfig,
    pub version: VersionConfig,
    pub backup: BackupConfig,
    pub logging: LoggingConfig,
}

/// Vendor download-links API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Endpoints tried in order until one answers.
    pub urls: Vec<String>,
    pub timeout_secs: u64,
}

/// Archive download behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Connect timeout and maximum time without receiving data.
    pub timeout_secs: u64,
    /// Additional attempts after the first one, for transient failures only.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// The vendor CDN turns away default HTTP client agents.
    pub user_agent: String,
    /// Root for the per-run work area. Defaults to the system temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

/// Paths kept from the live installation instead of the new archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    pub exclude_files: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

/// Where the installed version is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VersionConfig {
    /// Written after every successful merge.
    pub metadata_file: String,
    /// Only read, in order, when the metadata file yields nothing.
    pub fallback_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupConfig {
    pub prefix: String,
    /// Parent directory for snapshots. Defaults to the target's parent,
    /// against which a relative path also resolves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// File-name globs (`*`, `?` and `[...]`) left out of snapshots.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also append log records here. Relative paths resolve against the
    /// server directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://net-secondary.web.minecraft-services.net/api/v1.0/download/links".into(),
                "https://www.minecraft.net/api/v1.0/download/links".into(),
            ],
            timeout_secs: 30,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .into(),
            work_dir: None,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            exclude_files: vec![
                "server.properties".into(),
                "permissions.json".into(),
                "allowlist.json".into(),
                "whitelist.json".into(),
            ],
            exclude_dirs: vec!["worlds".into()],
        }
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            metadata_file: "bedrock_server_exe.version".into(),
            fallback_files: vec!["version.txt".into(), "CHANGES.txt".into()],
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            prefix: "backup".into(),
            dir: None,
            ignore: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `retry` (0-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        const MAX_BACKOFF: Duration = Duration::from_secs(30);
        let factor = 1u64.checked_shl(retry.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.level).unwrap_or(log::LevelFilter::Info)
    }
}

impl UpdaterConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: UpdaterConfig =
            toml::from_str(text).map_err(|e| UpdateError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            UpdateError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            UpdateError::ConfigInvalid(msg) => {
                UpdateError::ConfigInvalid(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Resolve the configuration for a run.
    ///
    /// An explicit path must exist. Otherwise `update_config.toml` in the
    /// server directory wins over the user config directory, and built-in
    /// defaults apply when neither exists.
    pub fn discover(explicit: Option<&Path>, server_dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            Some(server_dir.join(SERVER_CONFIG_FILE)),
            dirs::config_dir().map(|d| d.join("bedrock-updater").join("config.toml")),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Default configuration rendered as TOML, for `--dump-config`.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| UpdateError::ConfigInvalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.urls.is_empty() {
            return invalid("api.urls must list at least one endpoint");
        }
        for raw in &self.api.urls {
            let parsed = url::Url::parse(raw)
                .map_err(|e| UpdateError::ConfigInvalid(format!("api.urls: `{raw}`: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return invalid(format!("api.urls: `{raw}` is not an http(s) URL"));
            }
        }
        if self.api.timeout_secs == 0 {
            return invalid("api.timeout_secs must be greater than zero");
        }
        if self.download.timeout_secs == 0 {
            return invalid("download.timeout_secs must be greater than zero");
        }
        if self.download.max_retries > 10 {
            return invalid("download.max_retries must be at most 10");
        }

        for entry in &self.files.exclude_files {
            check_relative("files.exclude_files", entry)?;
        }
        for entry in &self.files.exclude_dirs {
            check_relative("files.exclude_dirs", entry)?;
        }
        check_relative("version.metadata_file", &self.version.metadata_file)?;
        for entry in &self.version.fallback_files {
            check_relative("version.fallback_files", entry)?;
        }

        if self.backup.prefix.is_empty()
            || self.backup.prefix.contains(['/', '\\'])
            || self.backup.prefix.starts_with('.')
        {
            return invalid("backup.prefix must be a plain, non-hidden name");
        }
        for pattern in &self.backup.ignore {
            if pattern.trim().is_empty() {
                return invalid("backup.ignore patterns must not be empty");
            }
            if let Err(e) = glob::Pattern::new(pattern.trim()) {
                return invalid(format!("backup.ignore `{pattern}`: {e}"));
            }
        }

        if log::LevelFilter::from_str(&self.logging.level).is_err() {
            return invalid(format!("logging.level: unknown level `{}`", self.logging.level));
        }

        Ok(())
    }
}

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(UpdateError::ConfigInvalid(msg.into()))
}

/// Entries are joined onto staging and target roots, so they must stay inside them.
fn check_relative(field: &str, entry: &str) -> Result<()> {
    if entry.trim().is_empty() {
        return invalid(format!("{field}: empty entry"));
    }
    let path = Path::new(entry);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return invalid(format!(
            "{field}: `{entry}` must be a relative path inside the server directory"
        ));
    }
    Ok(())
}
