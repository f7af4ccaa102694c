//! Undo/redo navigation replay.
//!
//! A navigation is not an edit. The surface is rebuilt from the three values
//! carried by the notification so the result is the same whatever history
//! engine produced it. Landing on the baseline entry always restores the
//! session baseline verbatim, never the (possibly lossy) snapshot.

use core_events::HistoryNavigation;
use core_surface::{Selection, TextSurface};
use tracing::debug;

/// Surface state to apply for a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restore {
    pub text: String,
    pub selection: Selection,
    pub focus: bool,
}

pub fn plan(baseline: &str, nav: &HistoryNavigation) -> Restore {
    if nav.is_baseline_entry {
        return Restore {
            text: baseline.to_string(),
            selection: Selection::caret(0),
            focus: false,
        };
    }
    let caret = nav.snapshot_caret.min(nav.snapshot_text.chars().count());
    Restore {
        text: nav.snapshot_text.clone(),
        selection: Selection::caret(caret),
        focus: true,
    }
}

/// Apply `restore` with notifications suppressed so the replay is not seen as
/// a new change.
pub fn apply<T: TextSurface + ?Sized>(surface: &mut T, restore: &Restore) {
    let notifications = surface.notifications_enabled();
    surface.set_notifications(false);
    surface.set_text(&restore.text);
    surface.set_selection(restore.selection.start, restore.selection.end);
    surface.set_notifications(notifications);
    if restore.focus {
        surface.focus();
    }
    debug!(target: "session.history", caret = restore.selection.end, focus = restore.focus, "history_restored");
}
