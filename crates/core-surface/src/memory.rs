//! In-memory text surface backed by a `ropey::Rope`.
//!
//! Used by the CLI and by tests in place of a platform editing control. User
//! edits go through [`MemorySurface::insert`] / [`MemorySurface::delete`] /
//! [`MemorySurface::replace_all`], which record an undo snapshot and emit
//! `TextChanged`. [`TextSurface::set_text`] is the programmatic path and never
//! touches history.

use core_events::{HistoryNavigation, SurfaceEvent, SurfaceNotifier};
use ropey::Rope;
use tracing::trace;

use crate::rich::RichDocument;
use crate::undo::{EditSnapshot, UndoEngine};
use crate::{Selection, TextSurface};

pub struct MemorySurface {
    rope: Rope,
    rich: bool,
    /// Document handed to `set_document` and its plain text, returned as-is by
    /// `document()` while the text still matches.
    loaded_document: Option<(RichDocument, String)>,
    history: UndoEngine,
    selection: Selection,
    focused: bool,
    notifications: bool,
    notifier: Option<SurfaceNotifier>,
    released: bool,
}

impl MemorySurface {
    pub fn new(notifier: SurfaceNotifier) -> Self {
        Self::with_notifier(Some(notifier))
    }

    /// Surface with no event channel (events are discarded).
    pub fn detached() -> Self {
        Self::with_notifier(None)
    }

    fn with_notifier(notifier: Option<SurfaceNotifier>) -> Self {
        Self {
            rope: Rope::new(),
            rich: false,
            loaded_document: None,
            history: UndoEngine::new(),
            selection: Selection::default(),
            focused: false,
            notifications: true,
            notifier,
            released: false,
        }
    }

    pub fn history(&self) -> &UndoEngine {
        &self.history
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Insert `s` at char offset `at` as a user edit; the caret lands after it.
    pub fn insert(&mut self, at: usize, s: &str) {
        let at = self.clamp(at);
        self.record_edit();
        self.rope.insert(at, s);
        self.selection = Selection::caret(at + s.chars().count());
        self.changed();
    }

    /// Delete chars in `start..end` as a user edit.
    pub fn delete(&mut self, start: usize, end: usize) {
        let (start, end) = (self.clamp(start.min(end)), self.clamp(start.max(end)));
        if start == end {
            return;
        }
        self.record_edit();
        self.rope.remove(start..end);
        self.selection = Selection::caret(start);
        self.changed();
    }

    /// Append at the end of the document as a user edit.
    pub fn append(&mut self, s: &str) {
        self.insert(self.rope.len_chars(), s);
    }

    /// Replace the whole document as a single user edit.
    pub fn replace_all(&mut self, text: &str) {
        self.record_edit();
        self.rope = Rope::from_str(text);
        self.selection = Selection::caret(self.rope.len_chars());
        self.changed();
    }

    /// Ask the session for an explicit save (Ctrl+S equivalent).
    pub fn request_save(&self) -> bool {
        self.emit(SurfaceEvent::SaveRequested)
    }

    fn record_edit(&mut self) {
        let text = self.rope.to_string();
        self.history.push_snapshot(&text, self.selection.end);
    }

    fn changed(&self) {
        self.emit(SurfaceEvent::TextChanged(self.rope.to_string()));
    }

    fn emit(&self, event: SurfaceEvent) -> bool {
        if !self.notifications {
            trace!(target: "surface", kind = event.kind(), "event_suppressed");
            return false;
        }
        match &self.notifier {
            Some(n) => n.notify(event),
            None => false,
        }
    }

    fn clamp(&self, at: usize) -> usize {
        at.min(self.rope.len_chars())
    }

    fn restore(&mut self, snapshot: &EditSnapshot) {
        self.rope = Rope::from_str(&snapshot.text);
        let caret = self.clamp(snapshot.caret);
        self.selection = Selection::caret(caret);
    }

    fn navigated(&self, snapshot: EditSnapshot) {
        let nav = HistoryNavigation {
            is_baseline_entry: self.history.at_baseline(),
            snapshot_text: snapshot.text,
            snapshot_caret: snapshot.caret,
        };
        self.emit(SurfaceEvent::HistoryNavigated(nav));
        self.changed();
    }
}

impl TextSurface for MemorySurface {
    fn initialize(&mut self, is_rich: bool) {
        self.rich = is_rich;
        self.rope = Rope::new();
        self.loaded_document = None;
        self.history.clear();
        self.selection = Selection::default();
        self.released = false;
        trace!(target: "surface", is_rich, "initialize");
    }

    fn is_rich(&self) -> bool {
        self.rich
    }

    fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        let caret = self.clamp(self.selection.end);
        self.selection = Selection::caret(caret);
        self.changed();
    }

    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn set_document(&mut self, document: RichDocument) {
        let plain = document.plain_text();
        self.rope = Rope::from_str(&plain);
        self.selection = Selection::default();
        self.loaded_document = Some((document, plain));
        self.changed();
    }

    fn document(&self) -> RichDocument {
        let text = self.rope.to_string();
        match &self.loaded_document {
            Some((doc, plain)) if *plain == text => doc.clone(),
            _ => RichDocument::from_plain_text(&text),
        }
    }

    fn can_undo(&self) -> bool {
        self.history.undo_depth() > 0
    }

    fn undo(&mut self) -> bool {
        let current = EditSnapshot::capture(&self.rope.to_string(), self.selection.end);
        let Some(previous) = self.history.undo(current) else {
            return false;
        };
        self.restore(&previous);
        self.navigated(previous);
        true
    }

    fn redo(&mut self) -> bool {
        let current = EditSnapshot::capture(&self.rope.to_string(), self.selection.end);
        let Some(next) = self.history.redo(current) else {
            return false;
        };
        self.restore(&next);
        self.navigated(next);
        true
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }

    fn mark_baseline(&mut self) {
        self.history.mark_baseline();
    }

    fn unmark_baseline(&mut self) {
        self.history.unmark_baseline();
    }

    fn set_selection(&mut self, start: usize, end: usize) {
        self.selection = Selection {
            start: self.clamp(start),
            end: self.clamp(end),
        };
    }

    fn selection(&self) -> Selection {
        self.selection
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn set_notifications(&mut self, enabled: bool) {
        self.notifications = enabled;
    }

    fn notifications_enabled(&self) -> bool {
        self.notifications
    }

    fn release(&mut self) {
        self.rope = Rope::new();
        self.loaded_document = None;
        self.history.clear();
        self.selection = Selection::default();
        self.focused = false;
        self.notifier = None;
        self.released = true;
        trace!(target: "surface", "released");
    }
}
