use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Maximum number of snapshots retained in undo history.
pub const UNDO_HISTORY_MAX: usize = 200;

/// A full-text snapshot for undo/redo (coarse clone; documents edited through a
/// session are single files of modest size).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditSnapshot {
    pub text: String,
    /// Caret offset in chars.
    pub caret: usize,
    /// Content hash at capture, used to skip identical successive snapshots.
    pub hash: u64,
}

impl EditSnapshot {
    pub fn capture(text: &str, caret: usize) -> Self {
        Self {
            text: text.to_string(),
            caret,
            hash: text_hash(text),
        }
    }
}

pub struct UndoEngine {
    undo_stack: Vec<EditSnapshot>,
    redo_stack: Vec<EditSnapshot>,
    /// Undo depth at which the last loaded/saved state sits. `None` once that
    /// state is unreachable (trimmed away, or dropped with the redo chain).
    baseline_depth: Option<usize>,
    /// Count of snapshots skipped due to identical successive state.
    snapshots_skipped: AtomicU64,
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoEngine {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            baseline_depth: Some(0),
            snapshots_skipped: AtomicU64::new(0),
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }
    pub fn snapshots_skipped(&self) -> u64 {
        self.snapshots_skipped.load(Ordering::Relaxed)
    }

    /// True when the current history position is the marked baseline.
    pub fn at_baseline(&self) -> bool {
        self.baseline_depth == Some(self.undo_stack.len())
    }

    /// Mark the current position as the baseline (after a save).
    pub fn mark_baseline(&mut self) {
        self.baseline_depth = Some(self.undo_stack.len());
        trace!(target: "surface.undo", depth = self.undo_stack.len(), "baseline_marked");
    }

    /// Forget the baseline position; no entry reports `at_baseline` until the
    /// next mark or `clear`.
    pub fn unmark_baseline(&mut self) {
        self.baseline_depth = None;
    }

    /// Record the state *before* an edit.
    pub fn push_snapshot(&mut self, text: &str, caret: usize) {
        let current_hash = text_hash(text);
        if let Some(last) = self.undo_stack.last()
            && last.hash == current_hash
            && last.text == text
        {
            self.snapshots_skipped.fetch_add(1, Ordering::Relaxed);
            trace!(target: "surface.undo", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), hash = current_hash, "snapshot_dedupe_skip");
            return;
        }
        let depth_before = self.undo_stack.len();
        self.undo_stack.push(EditSnapshot {
            text: text.to_string(),
            caret,
            hash: current_hash,
        });
        trace!(target: "surface.undo", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), hash = current_hash, "push_snapshot");
        if self.undo_stack.len() > UNDO_HISTORY_MAX {
            let _ = self.undo_stack.remove(0);
            self.baseline_depth = self.baseline_depth.and_then(|d| d.checked_sub(1));
            trace!(target: "surface.undo", "undo_stack_trimmed");
        }
        // A baseline ahead of the edit point lived on the redo chain.
        if self.baseline_depth.is_some_and(|d| d > depth_before) {
            self.baseline_depth = None;
        }
        if !self.redo_stack.is_empty() {
            self.redo_stack.clear();
            trace!(target: "surface.undo", "redo_stack_cleared_on_new_edit");
        }
    }

    /// Step back. `current` is the live state, moved onto the redo stack.
    /// Returns the snapshot to restore.
    pub fn undo(&mut self, current: EditSnapshot) -> Option<EditSnapshot> {
        let last = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        trace!(target: "surface.undo", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), "undo_pop");
        Some(last)
    }

    /// Step forward. `current` is the live state, moved onto the undo stack.
    pub fn redo(&mut self, current: EditSnapshot) -> Option<EditSnapshot> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        trace!(target: "surface.undo", undo_depth = self.undo_stack.len(), redo_depth = self.redo_stack.len(), "redo_pop");
        Some(next)
    }

    /// Forget all history; the current state becomes the new baseline.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.baseline_depth = Some(0);
        trace!(target: "surface.undo", "history_cleared");
    }
}

fn text_hash(text: &str) -> u64 {
    let mut h = DefaultHasher::new();
    h.write(text.as_bytes());
    h.finish()
}
