use core_config::Config;
use core_encoding::{TextEncoding, detect_with_fallback};
use core_events::{EventHooks, HistoryNavigation, SurfaceEvent};
use core_surface::TextSurface;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::storage::Storage;
use crate::tracker::{self, ChangeClass};
use crate::{FileTarget, Preferences, SessionError, SessionState, history};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Another load or save held the gate.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another load or save held the gate, or nothing has been loaded yet.
    Skipped,
}

struct SessionInner {
    state: SessionState,
    baseline: Option<String>,
    encoding: TextEncoding,
    line_count: usize,
    /// Successful writes since creation.
    saves: u64,
    closed: bool,
}

pub struct SessionController<S: Storage, T: TextSurface> {
    target: FileTarget,
    is_rich: bool,
    fallback: TextEncoding,
    storage: S,
    prefs: Arc<dyn Preferences>,
    surface: Mutex<T>,
    /// Load/save exclusion. `try_lock` for skip-if-busy, `lock` for close.
    gate: tokio::sync::Mutex<()>,
    inner: Mutex<SessionInner>,
    dirty: watch::Sender<bool>,
    ready: watch::Sender<bool>,
}

impl<S: Storage, T: TextSurface> SessionController<S, T> {
    /// Create a session for `target`. Rich vs. plain is fixed here from the
    /// file suffix and never changes afterwards.
    pub fn new(
        target: FileTarget,
        storage: S,
        surface: T,
        prefs: Arc<dyn Preferences>,
        config: &Config,
    ) -> Result<Self, SessionError> {
        if !config.is_supported_path(target.path()) {
            warn!(target: "session", file = %target, "unsupported_file_type");
            return Err(SessionError::UnsupportedType(target));
        }
        let is_rich = config.is_rich_path(target.path());
        debug!(target: "session", file = %target, is_rich, "session_created");
        Ok(Self {
            is_rich,
            fallback: config.effective_fallback,
            storage,
            prefs,
            surface: Mutex::new(surface),
            gate: tokio::sync::Mutex::new(()),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                baseline: None,
                encoding: TextEncoding::default(),
                line_count: 0,
                saves: 0,
                closed: false,
            }),
            dirty: watch::Sender::new(false),
            ready: watch::Sender::new(false),
            target,
        })
    }

    // ---------------------------------------------------------------------------------------------
    // Observable state
    // ---------------------------------------------------------------------------------------------

    pub fn target(&self) -> &FileTarget {
        &self.target
    }

    pub fn is_rich(&self) -> bool {
        self.is_rich
    }

    pub fn state(&self) -> SessionState {
        self.inner().state
    }

    pub fn is_dirty(&self) -> bool {
        *self.dirty.borrow()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner().baseline.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    /// Encoding recorded at load; reused by every plain-text save.
    pub fn encoding(&self) -> TextEncoding {
        self.inner().encoding
    }

    pub fn baseline(&self) -> Option<String> {
        self.inner().baseline.clone()
    }

    pub fn line_count(&self) -> usize {
        self.inner().line_count
    }

    /// Number of successful writes, including normalizing and auto saves.
    pub fn saves_completed(&self) -> u64 {
        self.inner().saves
    }

    /// Dirty/clean flag with change notification.
    pub fn subscribe_dirty(&self) -> watch::Receiver<bool> {
        self.dirty.subscribe()
    }

    /// Flips to true once a load completes, back to false on close.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Run `f` against the surface. Must not be called from inside another
    /// `with_surface` closure.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.surface())
    }

    /// True when the session can close without an implicit save.
    pub fn prepare_close(&self) -> bool {
        !self.is_dirty()
    }

    // ---------------------------------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------------------------------

    pub async fn load(&self) -> Result<LoadOutcome, SessionError> {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!(target: "session.gate", file = %self.target, op = "load", "busy_skip");
            return Ok(LoadOutcome::Skipped);
        };
        self.ensure_open()?;
        self.set_state(SessionState::Loading);
        let result = self.load_locked().await;
        self.set_state(SessionState::Idle);
        if let Err(e) = &result {
            error!(target: "session.io", file = %self.target, error = %e, "load_failed");
        }
        result
    }

    async fn load_locked(&self) -> Result<LoadOutcome, SessionError> {
        let (text, encoding) = if self.is_rich {
            let document = self
                .storage
                .load_document(&self.target)
                .await
                .map_err(|e| self.io_error(e))?;
            let mut surface = self.surface();
            surface.set_notifications(false);
            surface.initialize(true);
            surface.set_document(document);
            surface.clear_history();
            (surface.text(), None)
        } else {
            let bytes = self
                .storage
                .read_bytes(&self.target)
                .await
                .map_err(|e| self.io_error(e))?;
            let fallback = self.fallback;
            let detected =
                tokio::task::spawn_blocking(move || detect_with_fallback(&bytes, fallback)).await?;
            let mut surface = self.surface();
            surface.set_notifications(false);
            surface.initialize(false);
            surface.set_text(&detected.text);
            surface.set_selection(0, 0);
            surface.clear_history();
            (detected.text, Some(detected.encoding))
        };

        {
            let mut inner = self.inner();
            if let Some(encoding) = encoding {
                inner.encoding = encoding;
            }
            inner.line_count = line_count(&text);
            inner.baseline = Some(text);
        }
        self.surface().set_notifications(true);
        self.set_dirty(false);
        self.ready.send_replace(true);
        info!(
            target: "session.io",
            file = %self.target,
            rich = self.is_rich,
            encoding = self.encoding().label(),
            lines = self.line_count(),
            "load_complete"
        );
        Ok(LoadOutcome::Loaded)
    }

    pub async fn save(&self) -> Result<SaveOutcome, SessionError> {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!(target: "session.gate", file = %self.target, op = "save", "busy_skip");
            return Ok(SaveOutcome::Skipped);
        };
        self.ensure_open()?;
        self.save_locked().await
    }

    /// Caller holds the gate.
    async fn save_locked(&self) -> Result<SaveOutcome, SessionError> {
        if !self.is_loaded() {
            debug!(target: "session.gate", file = %self.target, "save_before_load_skip");
            return Ok(SaveOutcome::Skipped);
        }
        self.set_state(SessionState::Saving);
        let result = self.write_current().await;
        self.set_state(SessionState::Idle);
        let written = match result {
            Ok(text) => text,
            Err(e) => {
                error!(target: "session.io", file = %self.target, error = %e, "save_failed");
                return Err(e);
            }
        };

        // Edits that landed while the write was in flight are not on disk.
        let (current, settled) = {
            let mut surface = self.surface();
            let current = surface.text();
            let settled = tracker::matches_baseline(&written, &current);
            if settled {
                surface.mark_baseline();
            } else {
                surface.unmark_baseline();
            }
            (current, settled)
        };
        {
            let mut inner = self.inner();
            inner.line_count = line_count(&current);
            inner.baseline = Some(written);
            inner.saves += 1;
        }
        self.set_dirty(!settled);
        info!(target: "session.io", file = %self.target, settled, "save_complete");
        Ok(SaveOutcome::Saved)
    }

    /// Write the surface content; returns the text that was persisted.
    async fn write_current(&self) -> Result<String, SessionError> {
        if self.is_rich {
            let (text, document) = {
                let surface = self.surface();
                (surface.text(), surface.document())
            };
            self.storage
                .defer_updates(&self.target)
                .await
                .map_err(|e| self.io_error(e))?;
            let written = self.storage.save_document(&self.target, &document).await;
            // The bracket is closed even when the write failed.
            let completed = self.storage.complete_updates(&self.target).await;
            written.map_err(|e| self.io_error(e))?;
            completed.map_err(|e| self.io_error(e))?;
            Ok(text)
        } else {
            let text = self.surface().text();
            let encoding = self.encoding();
            self.storage
                .write_text(&self.target, &text, encoding)
                .await
                .map_err(|e| self.io_error(e))?;
            Ok(text)
        }
    }

    /// Save pending edits (waiting for any in-flight load/save first), then
    /// release the surface and cached state. Resources are released even when
    /// the final save fails; the error is returned.
    pub async fn close(&self) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;
        if self.is_closed() {
            return Ok(());
        }
        let saved = if self.is_dirty() {
            self.save_locked().await.map(|_| ())
        } else {
            Ok(())
        };
        self.release();
        saved
    }

    fn release(&self) {
        self.surface().release();
        {
            let mut inner = self.inner();
            inner.baseline = None;
            inner.line_count = 0;
            inner.closed = true;
        }
        self.ready.send_replace(false);
        info!(target: "session", file = %self.target, dirty = self.is_dirty(), "session_closed");
    }

    // ---------------------------------------------------------------------------------------------
    // Change tracking
    // ---------------------------------------------------------------------------------------------

    /// Classify a change notification. Returns true for a real edit.
    pub async fn on_text_changed(&self, new_text: &str) -> bool {
        let baseline = {
            let inner = self.inner();
            if inner.closed {
                return false;
            }
            inner.baseline.clone()
        };
        let Some(baseline) = baseline else {
            trace!(target: "session.tracker", "change_before_load_ignored");
            return false;
        };

        let class = {
            let mut surface = self.surface();
            tracker::classify(&baseline, new_text, || {
                tracker::peek_pre_edit(&mut *surface)
            })
        };
        self.inner().line_count = line_count(new_text);
        debug!(target: "session.tracker", file = %self.target, ?class, "change_classified");

        if class == ChangeClass::NoOp {
            self.set_dirty(false);
            if let Err(e) = self.save().await {
                warn!(target: "session.tracker", error = %e, "normalizing_save_failed");
            }
            self.surface().clear_history();
            return false;
        }

        if self.prefs.auto_save_enabled() {
            // A skipped save is covered by the in-flight one, which re-checks
            // the surface when it finishes.
            if self.save().await.is_err() {
                self.set_dirty(true);
            }
        } else {
            self.set_dirty(true);
        }
        true
    }

    /// Replay an undo/redo navigation onto the surface.
    pub fn on_history_navigated(&self, nav: &HistoryNavigation) {
        let Some(baseline) = self.baseline() else {
            trace!(target: "session.history", "navigation_before_load_ignored");
            return;
        };
        let restore = history::plan(&baseline, nav);
        history::apply(&mut *self.surface(), &restore);
    }

    /// Consume surface notifications until the channel closes or the session
    /// is closed.
    ///
    /// A navigation is classified on the text the reconciler restored; the
    /// `TextChanged` the surface sends right after it carries the pre-restore
    /// snapshot and is skipped.
    pub async fn run_events(&self, mut rx: Receiver<SurfaceEvent>, hooks: &dyn EventHooks) {
        let mut skip_echo = false;
        while let Some(event) = rx.recv().await {
            hooks.pre_handle(&event);
            trace!(target: "session.events", kind = event.kind(), "event_received");
            let echo = std::mem::take(&mut skip_echo);
            match &event {
                SurfaceEvent::TextChanged(_) if echo => {
                    trace!(target: "session.events", "navigation_echo_skipped");
                }
                SurfaceEvent::TextChanged(text) => {
                    self.on_text_changed(text).await;
                }
                SurfaceEvent::HistoryNavigated(nav) => {
                    self.on_history_navigated(nav);
                    let restored = self.with_surface(|s| s.text());
                    self.on_text_changed(&restored).await;
                    skip_echo = true;
                }
                SurfaceEvent::SaveRequested => {
                    if let Err(e) = self.save().await {
                        warn!(target: "session.events", error = %e, "requested_save_failed");
                    }
                }
                SurfaceEvent::InvalidateSaveState => self.set_dirty(true),
            }
            hooks.post_handle(&event);
            if self.is_closed() {
                break;
            }
        }
        debug!(target: "session.events", file = %self.target, "event_loop_exit");
    }

    // ---------------------------------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------------------------------

    fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn surface(&self) -> MutexGuard<'_, T> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        self.inner().state = state;
        trace!(target: "session.gate", file = %self.target, ?state, "state");
    }

    fn set_dirty(&self, dirty: bool) {
        let changed = self.dirty.send_if_modified(|current| {
            if *current == dirty {
                false
            } else {
                *current = dirty;
                true
            }
        });
        if changed {
            debug!(target: "session.dirty", file = %self.target, dirty, "dirty_changed");
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            Err(SessionError::Closed(self.target.clone()))
        } else {
            Ok(())
        }
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Storage {
            target: self.target.clone(),
            source,
        }
    }
}

fn line_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.lines().count()
    }
}
