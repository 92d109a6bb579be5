//! Interactive plan display and confirmation for `bedrock-updater`

use std::io::Write;

use anyhow::Result;
use inquire::{Confirm, InquireError};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::decision::{Decision, Mode};
use super::orchestration::{Plan, UpdateReport};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Display the plan banner
pub fn show_plan(plan: &Plan) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
    let _ = writeln!(stdout, "\n{RULE}");
    let _ = stdout.reset();

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let title = match plan.mode {
        Mode::Update => "Bedrock Dedicated Server update",
        Mode::Install => "Bedrock Dedicated Server install",
    };
    let _ = writeln!(stdout, "\n  {title}");
    let _ = stdout.reset();

    let _ = writeln!(stdout, "\n  Directory:  {}", plan.target_dir.display());
    match &plan.installed {
        Some(current) => {
            let _ = writeln!(stdout, "  Installed:  {current}");
        }
        None => {
            let _ = writeln!(stdout, "  Installed:  none");
        }
    }
    let _ = writeln!(
        stdout,
        "  Available:  {} ({}, {})",
        plan.release.version, plan.release.channel, plan.release.platform
    );

    let color = if plan.decision.proceeds() {
        Color::Green
    } else {
        Color::Yellow
    };
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)));
    let _ = writeln!(stdout, "\n  → {}", plan.decision);
    let _ = stdout.reset();

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
    let _ = writeln!(stdout, "\n{RULE}\n");
    let _ = stdout.reset();
}

/// Ask before touching the server directory. Defaults to no; Esc and
/// Ctrl-C count as a no.
pub fn confirm(plan: &Plan) -> Result<bool> {
    let question = match &plan.decision {
        Decision::FreshInstall => format!("Install {} now?", plan.release.version),
        _ => format!("Update to {} now?", plan.release.version),
    };

    declined_on_cancel(confirm_prompt(&question).prompt())
}

fn confirm_prompt(question: &str) -> Confirm<'_> {
    Confirm::new(question)
        .with_default(false)
        .with_help_message("Stop the server first; a backup is taken before any file is replaced")
}

fn declined_on_cancel(answer: std::result::Result<bool, InquireError>) -> Result<bool> {
    match answer {
        Ok(proceed) => Ok(proceed),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Confirmation prompt failed: {}", e)),
    }
}

/// Display update completion summary
pub fn show_completion(report: &UpdateReport) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    let _ = writeln!(stdout, "\n✓ Bedrock server {} installed", report.release.version);
    let _ = stdout.reset();

    if let Some(previous) = &report.previous {
        let _ = writeln!(stdout, "  Previous version: {previous}");
    }
    let _ = writeln!(stdout, "  Files written:    {}", report.files_written);

    if !report.preserved.is_empty() {
        let _ = writeln!(stdout, "  Kept from existing installation:");
        for path in &report.preserved {
            let _ = writeln!(stdout, "    • {}", path.display());
        }
    }

    match &report.backup {
        Some(backup) => {
            let _ = writeln!(stdout, "  Backup:           {}", backup.display());
        }
        None => {
            let _ = writeln!(stdout, "  Backup:           skipped (directory was empty)");
        }
    }

    if !report.metadata_written {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = writeln!(
            stdout,
            "  ⚠ Version file not written; the next run may reinstall this build"
        );
        let _ = stdout.reset();
    }
    let _ = writeln!(stdout);
}
