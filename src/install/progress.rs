//! Update progress tracking with download metadata

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use tokio::sync::mpsc;

/// Workflow step a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Resolve,
    Download,
    Extract,
    Preserve,
    Backup,
    Merge,
    WriteVersion,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Probe => "probe",
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Preserve => "preserve",
            Stage::Backup => "backup",
            Stage::Merge => "merge",
            Stage::WriteVersion => "version",
        }
    }
}

/// Metadata for tracking the archive download
#[derive(Debug, Clone)]
pub struct DownloadMetadata {
    /// Bytes downloaded so far in the current attempt
    pub bytes_downloaded: u64,

    /// Content-Length, when the server sent one
    pub total_bytes: Option<u64>,

    /// 1-based attempt number
    pub attempt: u32,
}

/// Progress event emitted by the installer
#[derive(Debug, Clone)]
pub struct InstallProgress {
    pub stage: Stage,
    pub message: String,

    /// Download-specific metadata (only during the download stage)
    pub download: Option<DownloadMetadata>,
}

impl InstallProgress {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            download: None,
        }
    }

    /// Create download progress with metadata
    pub fn download(bytes_downloaded: u64, total_bytes: Option<u64>, attempt: u32) -> Self {
        let mb_downloaded = bytes_downloaded as f64 / 1_048_576.0;
        let message = match total_bytes {
            Some(total) if total > 0 => format!(
                "Downloading ({:.1} MB / {:.1} MB)",
                mb_downloaded,
                total as f64 / 1_048_576.0
            ),
            _ => format!("Downloading ({mb_downloaded:.1} MB)"),
        };

        Self {
            stage: Stage::Download,
            message,
            download: Some(DownloadMetadata {
                bytes_downloaded,
                total_bytes,
                attempt,
            }),
        }
    }
}

/// Best-effort sender for progress events.
///
/// A closed or missing receiver never affects the update itself: the first
/// failure is logged and further events are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<InstallProgress>>,
    disabled: Arc<AtomicBool>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<InstallProgress>) -> Self {
        Self {
            tx: Some(tx),
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn send(&self, progress: InstallProgress) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }

        if let Some(ref tx) = self.tx
            && let Err(e) = tx.try_send(progress)
        {
            match e {
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Progress channel closed, continuing without progress updates");
                    self.disabled.store(true, Ordering::Relaxed);
                }
                mpsc::error::TrySendError::Full(_) => {
                    // Slow consumer; skip this update.
                }
            }
        }
    }

    pub fn stage(&self, stage: Stage, message: impl Into<String>) {
        self.send(InstallProgress::new(stage, message));
    }
}
