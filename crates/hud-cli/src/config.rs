//! TOML configuration for the `hud` binary.
//!
//! Loaded from `$XDG_CONFIG_HOME/hud/config.toml` unless `--config` names
//! another file. Every field is optional; command-line flags override file
//! values.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use hud_transcript::DEFAULT_MAX_LINE_BYTES;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Status line refresh period.
    pub refresh_interval_ms: u64,
    /// Deadline for a single transcript parse.
    pub parse_timeout_ms: u64,
    pub polling_interval_ms: u64,
    /// How often to retry native file watching while polling.
    pub recovery_interval_ms: u64,
    pub max_line_bytes: usize,
    /// Default tracing directive; `RUST_LOG` adds to it.
    pub log_filter: String,
    /// Issue log to summarize on the status line.
    pub issues: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
            parse_timeout_ms: 500,
            polling_interval_ms: 1_000,
            recovery_interval_ms: 30_000,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            log_filter: "hud=info".to_string(),
            issues: None,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/hud/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hud").join("config.toml"))
    }

    /// Loads `path`, or the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }
}
