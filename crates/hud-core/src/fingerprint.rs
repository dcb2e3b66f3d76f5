//! Change-detection fingerprint shared by the log readers.
//!
//! A reader records the fingerprint of the file it last parsed successfully
//! and skips the next parse when the fingerprint is unchanged. Transcripts
//! are append-only, so any append moves the size even when the filesystem's
//! mtime resolution is coarse.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// (modification time, size) of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileFingerprint {
    pub modified: SystemTime,
    pub size: u64,
}

impl FileFingerprint {
    /// Stats `path`. Returns `Ok(None)` when the file does not exist.
    pub fn of(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(metadata) => Self::from_metadata(&metadata).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Builds a fingerprint from already-fetched metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            modified: metadata.modified()?,
            size: metadata.len(),
        })
    }
}

/// Remembers the last committed fingerprint and answers "does this file
/// need a full re-parse?".
#[derive(Debug, Clone, Default)]
pub struct FingerprintCache {
    last: Option<FileFingerprint>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no parse has been committed yet or the fingerprint moved.
    pub fn needs_reparse(&self, current: &FileFingerprint) -> bool {
        self.last.as_ref() != Some(current)
    }

    /// Records the fingerprint of a successful parse.
    pub fn commit(&mut self, fingerprint: FileFingerprint) {
        self.last = Some(fingerprint);
    }
}
