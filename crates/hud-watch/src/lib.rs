//! HUD Watch - File change detection for live transcripts
//!
//! [`FileWatcher`] reports modifications of registered files on a bounded
//! channel, using native OS notifications when available and timed polling
//! otherwise. Switching between the two is automatic.

pub mod backend;
pub mod error;
pub mod event;
pub mod watcher;

pub use backend::{NativeBackend, NativeSession, NativeSink, NotifyBackend};
pub use error::WatchError;
pub use event::{WatchEvent, WatchEventKind, WatchMode};
pub use watcher::{
    FileWatcher, CHANNEL_CAPACITY, DEFAULT_POLLING_INTERVAL, DEFAULT_RECOVERY_INTERVAL,
};
