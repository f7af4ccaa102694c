//! Text surface abstraction consumed by document sessions.
//!
//! A surface is whatever renders and edits the document: a platform rich-edit
//! control, a terminal buffer, or the in-memory [`MemorySurface`] shipped here
//! for headless use and tests. The session only ever calls the primitives on
//! [`TextSurface`] and listens to the [`core_events::SurfaceEvent`]s the surface
//! emits; it never reaches into history or layout internals.
//!
//! Offsets in this crate (selection, caret) are char indices.

pub mod memory;
pub mod rich;
pub mod undo;

pub use memory::MemorySurface;
pub use rich::RichDocument;
pub use undo::{EditSnapshot, UNDO_HISTORY_MAX, UndoEngine};

/// Selection expressed as char offsets. `start == end` is a collapsed caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub const fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Primitives a session needs from the editing surface.
///
/// Implementations emit `SurfaceEvent::TextChanged` for content changes and
/// `SurfaceEvent::HistoryNavigated` for undo/redo while notifications are
/// enabled. With notifications disabled every primitive is silent; the
/// session relies on that while populating or restoring text.
pub trait TextSurface: Send {
    /// Reset the surface for a plain (`false`) or rich (`true`) document.
    fn initialize(&mut self, is_rich: bool);
    fn is_rich(&self) -> bool;

    /// Replace the whole content. Does not record a history entry.
    fn set_text(&mut self, text: &str);
    fn text(&self) -> String;

    /// Load a structured document (rich surfaces).
    fn set_document(&mut self, document: RichDocument);
    /// Current content as a structured document.
    fn document(&self) -> RichDocument;

    fn can_undo(&self) -> bool;
    fn undo(&mut self) -> bool;
    fn redo(&mut self) -> bool;
    fn clear_history(&mut self);
    /// Flag the current history position as the saved state, so navigating
    /// back to it reports a baseline entry.
    fn mark_baseline(&mut self);
    /// No history position holds the saved state.
    fn unmark_baseline(&mut self);

    fn set_selection(&mut self, start: usize, end: usize);
    fn selection(&self) -> Selection;
    fn focus(&mut self);

    fn set_notifications(&mut self, enabled: bool);
    fn notifications_enabled(&self) -> bool;

    /// Drop content, history and the notification channel.
    fn release(&mut self);
}
