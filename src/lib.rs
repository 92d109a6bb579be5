//! Minecraft Bedrock Dedicated Server updater
//!
//! Checks the vendor download API for the newest server build, downloads and
//! extracts it, and merges it into an existing installation while keeping
//! configuration files and worlds. A full backup is always taken before the
//! first file in the server directory is replaced.

pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod logging;

pub use config::UpdaterConfig;
pub use error::{Result, UpdateError};
