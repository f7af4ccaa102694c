#![allow(dead_code)] // Shared across integration tests; each test binary uses a subset of helpers.

use core_config::Config;
use core_encoding::{TextEncoding, encode};
use core_events::SurfaceEvent;
use core_session::{FileTarget, SessionController, StaticPreferences, Storage};
use core_surface::{MemorySurface, RichDocument};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::sync::mpsc::Receiver;

/// In-memory storage that records every call and can fail or hold writes.
#[derive(Default)]
pub struct RecordingStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    calls: Mutex<Vec<&'static str>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    hold: Mutex<Option<Arc<Notify>>>,
    /// Signalled when a write reaches the hold point.
    pub write_entered: Notify,
}

impl RecordingStorage {
    pub fn with_file(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Arc<Self> {
        let storage = Self::default();
        storage.put(path, bytes);
        Arc::new(storage)
    }

    pub fn put(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), bytes.into());
    }

    pub fn bytes(&self, path: impl Into<PathBuf>) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(&path.into()).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Park every subsequent write until `release` is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(release.clone());
        release
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    async fn before_write(&self, call: &'static str) -> io::Result<()> {
        self.record(call);
        let hold = self.hold.lock().unwrap().clone();
        if let Some(release) = hold {
            self.write_entered.notify_one();
            release.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk full"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, target: &FileTarget) -> io::Result<Vec<u8>> {
        self.bytes(target.path())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

impl Storage for RecordingStorage {
    async fn read_bytes(&self, target: &FileTarget) -> io::Result<Vec<u8>> {
        self.record("read_bytes");
        self.read(target)
    }

    async fn write_text(
        &self,
        target: &FileTarget,
        text: &str,
        encoding: TextEncoding,
    ) -> io::Result<()> {
        self.before_write("write_text").await?;
        self.put(target.path(), encode(text, &encoding));
        Ok(())
    }

    async fn load_document(&self, target: &FileTarget) -> io::Result<RichDocument> {
        self.record("load_document");
        self.read(target).map(RichDocument::from_bytes)
    }

    async fn save_document(&self, target: &FileTarget, document: &RichDocument) -> io::Result<()> {
        self.before_write("save_document").await?;
        self.put(target.path(), document.as_bytes().to_vec());
        Ok(())
    }

    async fn defer_updates(&self, _target: &FileTarget) -> io::Result<()> {
        self.record("defer_updates");
        Ok(())
    }

    async fn complete_updates(&self, _target: &FileTarget) -> io::Result<()> {
        self.record("complete_updates");
        Ok(())
    }
}

pub type TestSession = SessionController<Arc<RecordingStorage>, MemorySurface>;

pub struct Harness {
    pub session: TestSession,
    pub storage: Arc<RecordingStorage>,
    pub prefs: Arc<StaticPreferences>,
    pub events: Receiver<SurfaceEvent>,
    pub path: PathBuf,
}

pub fn config() -> Config {
    let mut cfg = Config::default();
    cfg.resolve();
    cfg
}

/// Session over an in-memory file `name` holding `bytes`.
pub fn harness(name: &str, bytes: impl Into<Vec<u8>>, auto_save: bool) -> Harness {
    let path = PathBuf::from(name);
    let storage = RecordingStorage::with_file(&path, bytes);
    let prefs = Arc::new(StaticPreferences::new(auto_save));
    let (notifier, events) = core_events::channel();
    let session = SessionController::new(
        FileTarget::new(&path),
        storage.clone(),
        MemorySurface::new(notifier),
        prefs.clone(),
        &config(),
    )
    .expect("supported file type");
    Harness {
        session,
        storage,
        prefs,
        events,
        path,
    }
}

/// Drain buffered surface events without dispatching them.
pub fn drain(events: &mut Receiver<SurfaceEvent>) -> Vec<SurfaceEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = events.try_recv() {
        out.push(ev);
    }
    out
}
