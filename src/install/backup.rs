//! Pre-update snapshots of the server directory
//!
//! A snapshot is a full recursive copy written next to the server directory
//! (or into the configured backup directory). It is copied into a hidden
//! `.partial` directory first and renamed once complete, so a directory with
//! the final name is always a finished snapshot. Every run writes a new
//! snapshot; an existing one is never reused or overwritten.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use log::{debug, info, warn};
use walkdir::WalkDir;

use super::lock::LOCK_FILE_NAME;
use super::version::Version;
use crate::config::BackupConfig;
use crate::error::{Result, UpdateError};

/// Creates snapshots of a server directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    prefix: String,
    dir: Option<PathBuf>,
    ignore: Vec<Pattern>,
}

impl BackupManager {
    pub fn new(config: &BackupConfig) -> Result<Self> {
        let ignore = config
            .ignore
            .iter()
            .map(|pattern| {
                Pattern::new(pattern.trim()).map_err(|e| {
                    UpdateError::ConfigInvalid(format!("backup.ignore `{pattern}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefix: config.prefix.clone(),
            dir: config.dir.clone(),
            ignore,
        })
    }

    /// `{prefix}_{version}_{host}`
    pub fn backup_name(&self, version: &Version, host: &str) -> String {
        format!("{}_{}_{}", self.prefix, version, host)
    }

    /// Preferred location of the snapshot of `target` for `version`.
    ///
    /// A relative backup directory resolves against the parent of `target`.
    pub fn backup_path(&self, target: &Path, version: &Version, host: &str) -> Result<PathBuf> {
        let name = self.backup_name(version, host);
        let parent = target
            .parent()
            .ok_or_else(|| UpdateError::backup(target, "server directory has no parent"))?;

        let base = match &self.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => parent.join(dir),
            None => parent.to_path_buf(),
        };
        let path = base.join(name);

        if path.starts_with(target) {
            return Err(UpdateError::backup(
                &path,
                "backup directory must not be inside the server directory",
            ));
        }
        Ok(path)
    }

    /// Copy `target` into a new snapshot directory and return its path.
    ///
    /// When the preferred name is taken by an earlier snapshot, `_1`, `_2`, ...
    /// is appended until a free name is found.
    pub fn snapshot(&self, target: &Path, version: &Version, host: &str) -> Result<PathBuf> {
        let backup = free_path(&self.backup_path(target, version, host)?)?;

        let base = backup
            .parent()
            .ok_or_else(|| UpdateError::backup(&backup, "backup path has no parent"))?;
        fs::create_dir_all(base).map_err(|e| UpdateError::backup(base, e))?;

        let partial = base.join(format!(
            ".{}.partial",
            backup.file_name().map(OsStr::to_string_lossy).unwrap_or_default()
        ));
        if partial.exists() {
            fs::remove_dir_all(&partial).map_err(|e| UpdateError::backup(&partial, e))?;
        }

        info!("Creating backup at {}", backup.display());
        let copied = match self.copy_tree(target, &partial) {
            Ok(copied) => copied,
            Err((path, e)) => {
                if let Err(cleanup) = fs::remove_dir_all(&partial) {
                    warn!("Could not remove incomplete backup {}: {cleanup}", partial.display());
                }
                return Err(UpdateError::backup(
                    &backup,
                    format!("copying {}: {e}", path.display()),
                ));
            }
        };

        fs::rename(&partial, &backup).map_err(|e| UpdateError::backup(&backup, e))?;
        info!("Backup complete: {copied} files in {}", backup.display());
        Ok(backup)
    }

    /// Async wrapper running the copy on the blocking pool.
    pub async fn snapshot_blocking(
        &self,
        target: &Path,
        version: &Version,
        host: &str,
    ) -> Result<PathBuf> {
        let manager = self.clone();
        let target = target.to_path_buf();
        let version = version.clone();
        let host = host.to_string();
        let join_target = target.clone();

        tokio::task::spawn_blocking(move || manager.snapshot(&target, &version, &host))
            .await
            .map_err(|e| UpdateError::backup(join_target, e))?
    }

    fn is_ignored(&self, name: &OsStr, depth: usize) -> bool {
        if depth == 1 && name == LOCK_FILE_NAME {
            return true;
        }
        let name = name.to_string_lossy();
        self.ignore.iter().any(|pattern| pattern.matches(&name))
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> std::result::Result<u64, (PathBuf, io::Error)> {
        fs::create_dir_all(dst).map_err(|e| (dst.to_path_buf(), e))?;
        let mut copied = 0u64;

        let walker = WalkDir::new(src)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_ignored(e.file_name(), e.depth()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(src).to_path_buf();
                (path, io::Error::from(e))
            })?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| (entry.path().to_path_buf(), io::Error::other(e)))?;
            let dest = dst.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&dest).map_err(|e| (dest.clone(), e))?;
            } else if file_type.is_symlink() {
                copy_symlink(entry.path(), &dest).map_err(|e| (entry.path().to_path_buf(), e))?;
            } else {
                fs::copy(entry.path(), &dest).map_err(|e| (entry.path().to_path_buf(), e))?;
                copied += 1;
            }
            debug!("Backed up {}", relative.display());
        }

        Ok(copied)
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dest: &Path) -> io::Result<()> {
    warn!("Skipping symbolic link {} in backup", src.display());
    Ok(())
}

/// Upper bound on `_n` suffixes tried for one snapshot name.
const MAX_SUFFIX: u32 = 999;

/// `preferred`, or the first `{preferred}_{n}` that does not exist yet.
fn free_path(preferred: &Path) -> Result<PathBuf> {
    if !preferred.exists() {
        return Ok(preferred.to_path_buf());
    }
    let name = preferred
        .file_name()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default()
        .into_owned();

    for n in 1..=MAX_SUFFIX {
        let candidate = preferred.with_file_name(format!("{name}_{n}"));
        if !candidate.exists() {
            info!(
                "Backup {} already exists, writing {}",
                preferred.display(),
                candidate.display()
            );
            return Ok(candidate);
        }
    }
    Err(UpdateError::backup(
        preferred,
        format!("{MAX_SUFFIX} backups with this name already exist"),
    ))
}

/// Machine name used in backup names, restricted to `[A-Za-z0-9._-]`.
pub fn host_identifier() -> String {
    #[cfg(unix)]
    let raw = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok());

    #[cfg(windows)]
    let raw = std::env::var("COMPUTERNAME").ok();

    #[cfg(not(any(unix, windows)))]
    let raw: Option<String> = None;

    sanitize_host(raw.as_deref().unwrap_or_default())
}

fn sanitize_host(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '.').to_string();
    if cleaned.is_empty() {
        "unknown-host".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manager(ignore: &[&str]) -> BackupManager {
        BackupManager::new(&BackupConfig {
            ignore: ignore.iter().map(|s| s.to_string()).collect(),
            ..BackupConfig::default()
        })
        .expect("manager")
    }

    fn version() -> Version {
        "1.21.120.4".parse().expect("version")
    }

    /// Relative path → file contents (directories map to None).
    fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.expect("walk"))
            .map(|e| {
                let rel = e.path().strip_prefix(root).expect("prefix").to_path_buf();
                let body = e.file_type().is_file().then(|| fs::read(e.path()).expect("read"));
                (rel, body)
            })
            .collect()
    }

    fn server_dir(parent: &Path) -> PathBuf {
        let target = parent.join("bedrock");
        fs::create_dir_all(target.join("worlds/Bedrock level/db")).expect("mkdir");
        fs::create_dir_all(target.join("empty_dir")).expect("mkdir");
        fs::write(target.join("server.properties"), "server-name=Dedicated").expect("write");
        fs::write(target.join("bedrock_server"), [0x7f, b'E', b'L', b'F', 0, 1, 2]).expect("write");
        fs::write(target.join("worlds/Bedrock level/db/000005.ldb"), vec![42u8; 4096]).expect("write");
        target
    }

    #[test]
    fn snapshot_is_identical_to_source() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = server_dir(parent.path());
        let before = snapshot_tree(&target);

        let backup = manager(&[])
            .snapshot(&target, &version(), "host-1")
            .expect("snapshot");

        assert_eq!(backup, parent.path().join("backup_1.21.120.4_host-1"));
        assert_eq!(snapshot_tree(&backup), before);
        assert_eq!(snapshot_tree(&target), before);
        assert!(!parent.path().join(".backup_1.21.120.4_host-1.partial").exists());
    }

    #[test]
    fn restoring_reproduces_original_tree() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = server_dir(parent.path());
        let before = snapshot_tree(&target);
        let backup = manager(&[]).snapshot(&target, &version(), "h").expect("snapshot");

        fs::write(target.join("bedrock_server"), "new build").expect("overwrite");
        fs::remove_dir_all(target.join("worlds")).expect("damage");

        fs::remove_dir_all(&target).expect("clear");
        let restore = BackupManager::new(&BackupConfig {
            prefix: "restore".into(),
            ..BackupConfig::default()
        })
        .expect("manager");
        let restored = restore
            .snapshot(&backup, &version(), "h")
            .expect("copy back");
        fs::rename(&restored, &target).expect("rename");

        assert_eq!(snapshot_tree(&target), before);
    }

    #[test]
    fn empty_directory_snapshot_succeeds() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = parent.path().join("fresh");
        fs::create_dir(&target).expect("mkdir");

        let backup = manager(&[]).snapshot(&target, &version(), "h").expect("snapshot");
        assert!(backup.is_dir());
        assert_eq!(fs::read_dir(&backup).expect("read").count(), 0);
    }

    #[test]
    fn lock_file_and_ignored_names_are_skipped() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = server_dir(parent.path());
        fs::write(target.join(LOCK_FILE_NAME), "1234").expect("lock");
        fs::write(target.join("updater.log"), "log").expect("log");

        let backup = manager(&["*.log"])
            .snapshot(&target, &version(), "h")
            .expect("snapshot");
        assert!(!backup.join(LOCK_FILE_NAME).exists());
        assert!(!backup.join("updater.log").exists());
        assert!(backup.join("server.properties").exists());
    }

    #[test]
    fn existing_backup_is_never_reused() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = server_dir(parent.path());
        let existing = parent.path().join("backup_1.21.120.4_h");
        fs::create_dir(&existing).expect("mkdir");
        fs::write(existing.join("marker"), "old").expect("write");
        let before = snapshot_tree(&target);

        let backup = manager(&[]).snapshot(&target, &version(), "h").expect("snapshot");
        assert_eq!(backup, parent.path().join("backup_1.21.120.4_h_1"));
        assert_eq!(snapshot_tree(&backup), before);
        assert_eq!(
            fs::read_to_string(existing.join("marker")).expect("read"),
            "old"
        );
        assert!(!existing.join("server.properties").exists());

        let again = manager(&[]).snapshot(&target, &version(), "h").expect("snapshot");
        assert_eq!(again, parent.path().join("backup_1.21.120.4_h_2"));
    }

    #[test]
    fn sibling_servers_on_same_version_get_separate_backups() {
        let parent = tempfile::tempdir().expect("tempdir");
        let first = server_dir(parent.path());
        let second = parent.path().join("creative");
        fs::create_dir(&second).expect("mkdir");
        fs::write(second.join("server.properties"), "gamemode=creative").expect("write");
        let first_before = snapshot_tree(&first);
        let second_before = snapshot_tree(&second);

        let m = manager(&[]);
        let a = m.snapshot(&first, &version(), "h").expect("first");
        let b = m.snapshot(&second, &version(), "h").expect("second");

        assert_ne!(a, b);
        assert_eq!(snapshot_tree(&a), first_before);
        assert_eq!(snapshot_tree(&b), second_before);
    }

    #[test]
    fn backup_inside_target_is_refused() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = server_dir(parent.path());
        let inside = BackupManager::new(&BackupConfig {
            dir: Some(target.join("backups")),
            ..BackupConfig::default()
        })
        .expect("manager");

        let err = inside.snapshot(&target, &version(), "h").unwrap_err();
        assert!(matches!(err, UpdateError::BackupFailed { .. }));
        assert!(!target.join("backups").exists());
    }

    #[test]
    fn relative_backup_dir_resolves_next_to_target() {
        let parent = tempfile::tempdir().expect("tempdir");
        let target = server_dir(parent.path());
        let m = BackupManager::new(&BackupConfig {
            dir: Some("snapshots".into()),
            ..BackupConfig::default()
        })
        .expect("manager");

        let path = m.backup_path(&target, &version(), "h").expect("path");
        assert_eq!(path, parent.path().join("snapshots/backup_1.21.120.4_h"));
    }

    #[test]
    fn ignore_globs_match_whole_names() {
        let m = manager(&["*.log", "core.?", "[Tt]mp"]);
        assert!(m.is_ignored(OsStr::new("updater.log"), 2));
        assert!(!m.is_ignored(OsStr::new("updater.log.txt"), 2));
        assert!(m.is_ignored(OsStr::new("core.1"), 1));
        assert!(!m.is_ignored(OsStr::new("core.12"), 1));
        assert!(m.is_ignored(OsStr::new("Tmp"), 1));
        assert!(!m.is_ignored(OsStr::new(LOCK_FILE_NAME), 2));
    }

    #[test]
    fn malformed_ignore_glob_is_a_config_error() {
        let err = BackupManager::new(&BackupConfig {
            ignore: vec!["[unclosed".into()],
            ..BackupConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, UpdateError::ConfigInvalid(_)));
    }

    #[test]
    fn host_names_are_sanitized() {
        assert_eq!(sanitize_host("My Server/01"), "My-Server-01");
        assert_eq!(sanitize_host("  "), "unknown-host");
        assert_eq!(sanitize_host("box.local"), "box.local");
        assert!(!host_identifier().is_empty());
    }
}
