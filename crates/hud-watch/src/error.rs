//! Watcher error types.

use thiserror::Error;

/// Errors reported by [`FileWatcher`](crate::FileWatcher).
///
/// `Backend` errors are never returned from the public API; they are logged
/// and published on the error channel while the watcher falls back to
/// polling. The lifecycle variants are returned for misuse only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Native watch backend failed: {0}")]
    Backend(String),

    #[error("Watcher already started")]
    AlreadyStarted,

    #[error("Watcher stopped")]
    Stopped,
}

impl From<notify::Error> for WatchError {
    fn from(err: notify::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
