//! Command-line front end for the session HUD.
//!
//! Follows one transcript (and optionally an issue log) and prints a status
//! line whenever it changes. Logs go to `~/.local/state/hud/hud.log` so the
//! status output stays clean.
//!
//! # Panic-Free Guarantees
//!
//! This crate follows strict panic-free policies:
//! - No `.unwrap()` or `.expect()` outside tests
//! - Config and I/O failures propagate through `anyhow::Result`
//! - Parse failures are logged and the previous snapshot is kept

pub mod app;
pub mod args;
pub mod config;
pub mod logging;
pub mod render;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

pub use app::App;
pub use args::Args;
pub use config::{Config, ConfigError};
pub use render::{render, Snapshot, WAITING_PLACEHOLDER};

/// Entry point for the `hud` binary.
pub async fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    logging::init(&config.log_filter);
    info!(
        transcript = %args.transcript.display(),
        once = args.once,
        refresh_ms = config.refresh_interval_ms,
        "Starting HUD"
    );

    if args.once {
        app::run_once(&args.transcript, config).await
    } else {
        app::run_live(&args.transcript, config).await
    }
}
