//! Tracing setup.
//!
//! stdout carries the status line, so logs go to
//! `$XDG_STATE_HOME/hud/hud.log`. Logging is disabled when that file cannot
//! be opened.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "hud.log";

pub fn log_dir() -> Option<PathBuf> {
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg_state).join("hud"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/hud"))
}

fn create_log_file() -> Option<File> {
    let log_dir = log_dir()?;

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {log_dir:?}: {e}");
        return None;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Failed to open log file {log_path:?}: {e}");
            None
        }
    }
}

/// Builds the filter: `RUST_LOG` plus the configured default directive.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    let directive = default_directive.parse().unwrap_or_else(|_| {
        tracing_subscriber::filter::Directive::from(tracing::Level::INFO)
    });
    EnvFilter::from_default_env().add_directive(directive)
}

/// Installs the global subscriber. Returns false when logging is disabled.
pub fn init(default_directive: &str) -> bool {
    match create_log_file() {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(env_filter(default_directive))
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init()
            .is_ok(),
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("off"))
                .try_init();
            false
        }
    }
}
