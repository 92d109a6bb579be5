//! Terminal detection for prompting
//!
//! Scheduled runs (cron, systemd timers, Task Scheduler) have no terminal, so
//! the updater must never block on a prompt there.

use std::io::IsTerminal;

/// Check if a person can answer prompts
///
/// Returns `true` only when both stdin and stdout are terminals.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}
