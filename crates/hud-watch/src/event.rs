//! Watch events and modes.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

/// A change to a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Canonical path of the watched file.
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn modified(path: PathBuf) -> Self {
        Self {
            path,
            kind: WatchEventKind::Modified,
        }
    }
}

/// Active change-detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WatchMode {
    /// OS notifications through the native backend.
    Native,
    /// Periodic mtime checks.
    #[default]
    Polling,
}

impl WatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
