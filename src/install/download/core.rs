//! Archive download with streaming, retries and progress tracking

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use log::{info, warn};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use super::retry::Failure;
use crate::config::DownloadConfig;
use crate::error::{Result, UpdateError};
use crate::install::progress::{InstallProgress, ProgressSink};

/// Emit a progress event at most every 256KB
const PROGRESS_CHUNK: u64 = 256 * 1024;

/// Fetches release archives to disk.
pub struct Downloader {
    client: reqwest::Client,
    inactivity_timeout: Duration,
    config: DownloadConfig,
    progress: ProgressSink,
}

impl Downloader {
    pub fn new(config: &DownloadConfig, progress: ProgressSink) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| UpdateError::download(format!("HTTP client setup: {e}")))?;

        Ok(Self {
            client,
            inactivity_timeout: config.timeout(),
            config: config.clone(),
            progress,
        })
    }

    /// Download `url` into `dir/file_name`, streaming to disk.
    ///
    /// Transient failures are retried up to `max_retries` times with
    /// exponential backoff. When `checksum` is given the SHA-256 of the body
    /// must match it.
    pub async fn fetch(
        &self,
        url: &str,
        dir: &Path,
        file_name: &str,
        checksum: Option<&str>,
    ) -> Result<PathBuf> {
        let dest = dir.join(file_name);
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            match self.fetch_once(url, &dest, attempt, checksum).await {
                Ok(bytes) => {
                    info!("Downloaded {bytes} bytes to {}", dest.display());
                    return Ok(dest);
                }
                Err(Failure::Transient(reason)) if attempt < attempts => {
                    let delay = self.config.backoff(attempt - 1);
                    warn!(
                        "Download attempt {attempt}/{attempts} failed: {reason}; retrying in {} ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Failure::Transient(reason)) => {
                    return Err(UpdateError::download(format!(
                        "{reason} (gave up after {attempts} attempts)"
                    )));
                }
                Err(Failure::Permanent(reason)) => {
                    return Err(UpdateError::download(reason));
                }
            }
        }

        Err(UpdateError::download("no download attempt was made"))
    }

    /// One attempt. Truncates any partial file from a previous attempt.
    async fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
        attempt: u32,
        checksum: Option<&str>,
    ) -> std::result::Result<u64, Failure> {
        let response = match timeout(self.inactivity_timeout, self.client.get(url).send()).await {
            Ok(result) => result.map_err(|e| Failure::from_reqwest(&e))?,
            Err(_) => {
                return Err(Failure::Transient(format!(
                    "no response within {} seconds",
                    self.inactivity_timeout.as_secs()
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::from_status(status));
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Failure::Permanent(format!("cannot create {}: {e}", dest.display())))?;

        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_progress_bytes = 0u64;

        self.progress.send(InstallProgress::download(0, total_bytes, attempt));

        loop {
            let chunk = match timeout(self.inactivity_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(Failure::from_reqwest(&e)),
                Ok(None) => break,
                Err(_) => {
                    return Err(Failure::Transient(format!(
                        "no data received for {} seconds after {downloaded} bytes",
                        self.inactivity_timeout.as_secs()
                    )));
                }
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| Failure::Permanent(format!("cannot write {}: {e}", dest.display())))?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if downloaded - last_progress_bytes >= PROGRESS_CHUNK {
                self.progress
                    .send(InstallProgress::download(downloaded, total_bytes, attempt));
                last_progress_bytes = downloaded;
            }
        }

        file.flush()
            .await
            .map_err(|e| Failure::Permanent(format!("cannot write {}: {e}", dest.display())))?;

        if let Some(expected) = total_bytes
            && downloaded < expected
        {
            return Err(Failure::Transient(format!(
                "connection closed after {downloaded} of {expected} bytes"
            )));
        }
        if downloaded == 0 {
            return Err(Failure::Permanent("server returned an empty body".into()));
        }
        if let Some(expected) = checksum {
            let actual = hex::encode(hasher.finalize());
            if actual != expected {
                return Err(Failure::Permanent(format!(
                    "checksum mismatch (expected {expected}, got {actual})"
                )));
            }
        }

        self.progress
            .send(InstallProgress::download(downloaded, total_bytes, attempt));
        Ok(downloaded)
    }
}
