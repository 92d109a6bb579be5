//! Command-line runner
//!
//! Drives [`Installer`] for the `bedrock-updater` binary: progress bar,
//! plan display, confirmation prompt and coloured summaries.

use std::io::Write;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::sync::mpsc;

use super::environment::is_interactive;
use super::orchestration::Installer;
use super::progress::{InstallProgress, Stage};
use super::wizard;
use crate::cli::Args;
use crate::config::UpdaterConfig;
use crate::error::UpdateError;

/// Run one update or install as requested on the command line.
pub async fn run_cli(args: &Args, config: UpdaterConfig) -> Result<()> {
    let options = args.run_options();

    let (tx, rx) = mpsc::channel::<InstallProgress>(100);
    let installer = Installer::new(config)?.with_progress(tx);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.green/blue}] {bytes}/{total_bytes}  {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );
    let progress_task = tokio::spawn(consume_progress(rx, pb.clone()));

    let plan = match installer.plan(&options).await {
        Ok(plan) => plan,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    };

    pb.suspend(|| wizard::show_plan(&plan));

    let proceed = if options.check_only || !plan.decision.proceeds() {
        false
    } else if args.skip_confirmation() || !is_interactive() {
        true
    } else if pb.suspend(|| wizard::confirm(&plan))? {
        true
    } else {
        pb.suspend(|| {
            let _ = writeln!(StandardStream::stdout(ColorChoice::Auto), "Cancelled, nothing changed.");
        });
        false
    };

    if !proceed {
        pb.finish_and_clear();
        drop(installer);
        progress_task.await.ok();
        return Ok(());
    }

    let result = installer.apply(&plan).await;

    // Closing the sender ends the consumer task
    drop(installer);
    progress_task.await.ok();
    pb.finish_and_clear();

    match result {
        Ok(report) => {
            wizard::show_completion(&report);
            Ok(())
        }
        Err(e) => {
            if e.is_partial_update() {
                show_recovery(&e);
            }
            Err(e.into())
        }
    }
}

async fn consume_progress(mut rx: mpsc::Receiver<InstallProgress>, pb: ProgressBar) {
    while let Some(progress) = rx.recv().await {
        match (&progress.stage, &progress.download) {
            (Stage::Download, Some(meta)) => {
                if let Some(total) = meta.total_bytes {
                    pb.set_length(total);
                }
                pb.set_position(meta.bytes_downloaded);
                if meta.attempt > 1 {
                    pb.set_message(format!("📥 {} (attempt {})", progress.message, meta.attempt));
                } else {
                    pb.set_message(format!("📥 {}", progress.message));
                }
            }
            (stage, _) => {
                pb.set_message(format!("[{}] {}", stage.label(), progress.message));
                pb.tick();
            }
        }
    }
}

/// A merge failure leaves the directory half-updated; say where the backup is.
fn show_recovery(err: &UpdateError) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = writeln!(stderr, "\n❌ UPDATE INCOMPLETE: {err}");
    let _ = stderr.reset();
    if let Some(hint) = err.recovery_hint() {
        let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
        let _ = writeln!(stderr, "   {hint}");
        let _ = stderr.reset();
    }
    let _ = writeln!(stderr, "   Do not start the server until the directory is restored.\n");
}
