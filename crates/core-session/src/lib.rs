//! Document session controller.
//!
//! One [`SessionController`] owns the editing lifecycle of one file:
//!
//! * load: storage read, encoding detection (plain text) or structured load
//!   (rich text), surface population with notifications suppressed;
//! * change tracking: every `TextChanged` notification is classified by
//!   [`tracker`] as a real edit or a no-op, which drives the dirty flag and
//!   auto-save;
//! * history reconciliation: undo/redo navigation is replayed by [`history`]
//!   instead of being diffed;
//! * save / close: serialized against load by a single exclusion gate.
//!
//! State machine: `Idle -> Loading -> Idle`, `Idle -> Saving -> Idle`. A load or
//! save requested while the gate is held is skipped, never queued. `close`
//! waits for the gate so it observes the dirty flag after any in-flight save.

pub mod controller;
pub mod history;
pub mod prefs;
pub mod storage;
pub mod tracker;

use std::fmt;
use std::path::{Path, PathBuf};

pub use controller::{LoadOutcome, SaveOutcome, SessionController};
pub use prefs::{Preferences, StaticPreferences};
pub use storage::{FsStorage, Storage};
pub use tracker::ChangeClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Saving,
}

/// Identity of the file a session edits. I/O goes through [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileTarget(PathBuf);

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("i/o on {target} failed: {source}")]
    Storage {
        target: FileTarget,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported file type: {0}")]
    UnsupportedType(FileTarget),
    #[error("session for {0} is closed")]
    Closed(FileTarget),
    #[error("background decode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
