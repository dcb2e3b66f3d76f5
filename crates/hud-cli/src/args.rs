//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// HUD - live status line for a Claude Code session
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "hud")]
#[command(about = "Follow a Claude Code transcript and print a live status line")]
#[command(version)]
pub struct Args {
    /// Session transcript (JSON lines) to follow
    pub transcript: PathBuf,

    /// Config file (default: $XDG_CONFIG_HOME/hud/config.toml)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Parse once, print the status line and exit
    #[arg(long)]
    pub once: bool,

    /// Refresh interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Issue log (JSON lines) to summarize
    #[arg(long, value_name = "PATH")]
    pub issues: Option<PathBuf>,
}

impl Args {
    /// Applies flag overrides on top of file configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.refresh_interval_ms = interval;
        }
        if let Some(issues) = &self.issues {
            config.issues = Some(issues.clone());
        }
    }
}
