//! Dirty-state classification of text-change notifications.
//!
//! Only trailing whitespace is normalized before comparing. Whitespace changes
//! elsewhere in the text count as real edits; trailing-only changes and exact
//! round trips to the baseline (auto-formatters, undo back to start) do not.

use core_surface::TextSurface;

/// Verdict for one change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    /// Trimmed text equals the baseline.
    NoOp,
    /// Real edit whose trimmed text matches the surface's pre-edit text.
    Incremental,
    /// Real edit that could not be tied to the surface's last single edit
    /// (differs from it, or the surface has no undo).
    Divergent,
}

impl ChangeClass {
    pub fn is_real_edit(self) -> bool {
        !matches!(self, ChangeClass::NoOp)
    }
}

pub fn trim_trailing(text: &str) -> &str {
    text.trim_end()
}

/// Whether `text` matches `baseline` once trailing whitespace is ignored.
pub fn matches_baseline(baseline: &str, text: &str) -> bool {
    trim_trailing(baseline) == trim_trailing(text)
}

/// Classify `new_text` against `baseline`. `pre_edit` is only consulted for
/// real edits and yields the text before the surface's most recent single
/// edit, or `None` when the surface cannot undo.
pub fn classify<F>(baseline: &str, new_text: &str, pre_edit: F) -> ChangeClass
where
    F: FnOnce() -> Option<String>,
{
    if matches_baseline(baseline, new_text) {
        return ChangeClass::NoOp;
    }
    match pre_edit() {
        Some(before) if trim_trailing(&before) == trim_trailing(new_text) => ChangeClass::Incremental,
        _ => ChangeClass::Divergent,
    }
}

/// Text before the surface's most recent edit, read by stepping back and
/// forward through its history with notifications suppressed. Selection is
/// restored afterwards.
pub fn peek_pre_edit<T: TextSurface + ?Sized>(surface: &mut T) -> Option<String> {
    if !surface.can_undo() {
        return None;
    }
    let notifications = surface.notifications_enabled();
    let selection = surface.selection();
    surface.set_notifications(false);
    let before = if surface.undo() {
        let text = surface.text();
        surface.redo();
        Some(text)
    } else {
        None
    };
    surface.set_selection(selection.start, selection.end);
    surface.set_notifications(notifications);
    before
}
