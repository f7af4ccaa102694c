//! Notification events flowing from a text surface to its document session.
//!
//! The surface is synchronous (it lives on the interactive context) while the
//! session consumes notifications from an async task, so events travel over a
//! bounded tokio mpsc channel. Producers use `try_send` and never block the
//! surface; a full or closed channel is counted and logged, not retried.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// One surface produces, one session consumes. Change notifications are idempotent with respect to
// the latest text (the tracker compares whole-text snapshots), so dropping an event under extreme
// backpressure loses no information the next event does not carry. History navigation events are
// not idempotent; the capacity is sized so a human-driven undo burst never fills it.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

// Telemetry counters (relaxed fetch_add, inspected by tests and logged at shutdown).
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static EVENTS_SENT: AtomicU64 = AtomicU64::new(0);

/// Payload of an undo/redo navigation. Carries only what the session needs to
/// rebuild editor state, independent of how the surface stores its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryNavigation {
    /// The navigation landed on the entry recorded when the document was loaded.
    pub is_baseline_entry: bool,
    pub snapshot_text: String,
    /// Caret offset in chars.
    pub snapshot_caret: usize,
}

/// Events emitted by a text surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Content changed; carries the full current text.
    TextChanged(String),
    /// Undo or redo moved through the history.
    HistoryNavigated(HistoryNavigation),
    /// User asked for an explicit save (e.g. Ctrl+S).
    SaveRequested,
    /// Surface knows its content no longer matches storage without a text diff.
    InvalidateSaveState,
}

impl SurfaceEvent {
    /// Short stable name for log fields (never logs text payloads).
    pub fn kind(&self) -> &'static str {
        match self {
            SurfaceEvent::TextChanged(_) => "text_changed",
            SurfaceEvent::HistoryNavigated(_) => "history_navigated",
            SurfaceEvent::SaveRequested => "save_requested",
            SurfaceEvent::InvalidateSaveState => "invalidate_save_state",
        }
    }
}

/// Optional hooks observing events at the session boundary. Must not block.
pub trait EventHooks: Send + Sync + 'static {
    fn pre_handle(&self, _event: &SurfaceEvent) {}
    fn post_handle(&self, _event: &SurfaceEvent) {}
}

/// Default no-op hooks implementation.
pub struct NoopEventHooks;

impl EventHooks for NoopEventHooks {}

/// Sending half held by a surface.
#[derive(Debug, Clone)]
pub struct SurfaceNotifier {
    tx: Sender<SurfaceEvent>,
}

impl SurfaceNotifier {
    pub fn new(tx: Sender<SurfaceEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event without blocking. Returns false when it was dropped.
    pub fn notify(&self, event: SurfaceEvent) -> bool {
        let kind = event.kind();
        match self.tx.try_send(event) {
            Ok(()) => {
                EVENTS_SENT.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target: "events", kind, "event_sent");
                true
            }
            Err(TrySendError::Full(_)) => {
                CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "events", kind, "event_dropped_channel_full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "events", kind, "event_dropped_channel_closed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create the bounded notification channel sized by [`EVENT_CHANNEL_CAP`].
pub fn channel() -> (SurfaceNotifier, Receiver<SurfaceEvent>) {
    channel_with_capacity(EVENT_CHANNEL_CAP)
}

pub fn channel_with_capacity(cap: usize) -> (SurfaceNotifier, Receiver<SurfaceEvent>) {
    let (tx, rx) = mpsc::channel(cap);
    (SurfaceNotifier::new(tx), rx)
}
