use std::path::PathBuf;

use clap::Parser;

use crate::install::{Channel, Mode, RunOptions};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Minecraft Bedrock Dedicated Server updater")]
pub struct Args {
    /// Use the preview channel instead of release
    #[arg(long)]
    pub preview: bool,

    /// Skip the version check and the confirmation prompt
    #[arg(long)]
    pub force: bool,

    /// Server directory to update
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Report whether an update is available and exit
    #[arg(long)]
    pub check_only: bool,

    /// Fresh install: keep only configuration that already exists
    #[arg(long)]
    pub install: bool,

    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Answer yes to the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    pub dump_config: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            target_dir: self.dir.clone(),
            channel: Channel::from_preview_flag(self.preview),
            force: self.force,
            check_only: self.check_only,
            mode: if self.install { Mode::Install } else { Mode::Update },
        }
    }

    /// Whether to apply without asking.
    pub fn skip_confirmation(&self) -> bool {
        self.force || self.yes
    }
}
