//! Type definitions for file watcher events
//!
//! This module defines the normalized change event handed from the watcher
//! to the pending change set.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// Represents a file system change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub detected_at: SystemTime,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind, detected_at: SystemTime) -> Self {
        Self {
            path: path.into(),
            kind,
            detected_at,
        }
    }
}

/// Types of file system changes we track
///
/// Renames arrive as a `Removed` for the old path and an `Added` for the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}
