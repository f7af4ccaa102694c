//! Storage collaborator: byte reads, encoded text writes, structured document
//! load/save, and deferred-update bracketing.
//!
//! Futures returned here are awaited by the session without holding any lock,
//! so implementations are free to hop to blocking threads.

use core_encoding::{TextEncoding, encode};
use core_surface::RichDocument;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

use crate::FileTarget;

pub trait Storage: Send + Sync {
    fn read_bytes(&self, target: &FileTarget) -> impl Future<Output = io::Result<Vec<u8>>> + Send;

    fn write_text(
        &self,
        target: &FileTarget,
        text: &str,
        encoding: TextEncoding,
    ) -> impl Future<Output = io::Result<()>> + Send;

    fn load_document(
        &self,
        target: &FileTarget,
    ) -> impl Future<Output = io::Result<RichDocument>> + Send;

    fn save_document(
        &self,
        target: &FileTarget,
        document: &RichDocument,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Open a bracket: writes to `target` until `complete_updates` must not be
    /// visible to other readers.
    fn defer_updates(&self, target: &FileTarget) -> impl Future<Output = io::Result<()>> + Send;

    /// Close the bracket opened by `defer_updates`, publishing staged writes.
    fn complete_updates(&self, target: &FileTarget)
    -> impl Future<Output = io::Result<()>> + Send;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn read_bytes(&self, target: &FileTarget) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        (**self).read_bytes(target)
    }

    fn write_text(
        &self,
        target: &FileTarget,
        text: &str,
        encoding: TextEncoding,
    ) -> impl Future<Output = io::Result<()>> + Send {
        (**self).write_text(target, text, encoding)
    }

    fn load_document(
        &self,
        target: &FileTarget,
    ) -> impl Future<Output = io::Result<RichDocument>> + Send {
        (**self).load_document(target)
    }

    fn save_document(
        &self,
        target: &FileTarget,
        document: &RichDocument,
    ) -> impl Future<Output = io::Result<()>> + Send {
        (**self).save_document(target, document)
    }

    fn defer_updates(&self, target: &FileTarget) -> impl Future<Output = io::Result<()>> + Send {
        (**self).defer_updates(target)
    }

    fn complete_updates(
        &self,
        target: &FileTarget,
    ) -> impl Future<Output = io::Result<()>> + Send {
        (**self).complete_updates(target)
    }
}

/// Local filesystem storage on tokio's blocking pool.
///
/// Deferred updates stage structured-document writes in a hidden sibling file
/// and rename it over the target on completion, so readers never observe a
/// half-written document.
#[derive(Debug, Default)]
pub struct FsStorage {
    /// Open brackets: target -> staged file written inside the bracket.
    deferred: Mutex<HashMap<PathBuf, Option<PathBuf>>>,
}

impl FsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn deferred(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Option<PathBuf>>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.quill-tmp"))
}

impl Storage for FsStorage {
    async fn read_bytes(&self, target: &FileTarget) -> io::Result<Vec<u8>> {
        let bytes = tokio::fs::read(target.path()).await?;
        debug!(target: "session.io", file = %target, size_bytes = bytes.len(), "file_read_ok");
        Ok(bytes)
    }

    async fn write_text(
        &self,
        target: &FileTarget,
        text: &str,
        encoding: TextEncoding,
    ) -> io::Result<()> {
        let bytes = encode(text, &encoding);
        let size_bytes = bytes.len();
        tokio::fs::write(target.path(), bytes).await?;
        debug!(target: "session.io", file = %target, size_bytes, encoding = encoding.label(), "file_write_ok");
        Ok(())
    }

    async fn load_document(&self, target: &FileTarget) -> io::Result<RichDocument> {
        let bytes = tokio::fs::read(target.path()).await?;
        debug!(target: "session.io", file = %target, size_bytes = bytes.len(), "document_read_ok");
        Ok(RichDocument::from_bytes(bytes))
    }

    async fn save_document(&self, target: &FileTarget, document: &RichDocument) -> io::Result<()> {
        let bracketed = self.deferred().contains_key(target.path());
        if !bracketed {
            return tokio::fs::write(target.path(), document.as_bytes()).await;
        }
        let staged = staging_path(target.path());
        if let Err(e) = tokio::fs::write(&staged, document.as_bytes()).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e);
        }
        trace!(target: "session.io", file = %target, staged = %staged.display(), "document_staged");
        self.deferred()
            .insert(target.path().to_path_buf(), Some(staged));
        Ok(())
    }

    async fn defer_updates(&self, target: &FileTarget) -> io::Result<()> {
        self.deferred().insert(target.path().to_path_buf(), None);
        trace!(target: "session.io", file = %target, "updates_deferred");
        Ok(())
    }

    async fn complete_updates(&self, target: &FileTarget) -> io::Result<()> {
        let entry = self.deferred().remove(target.path());
        if let Some(Some(staged)) = entry {
            tokio::fs::rename(&staged, target.path()).await?;
        }
        trace!(target: "session.io", file = %target, "updates_completed");
        Ok(())
    }
}
