//! In-memory backend implementation.

use super::{AssetStore, BoxFuture, DocumentBackend};
use crate::document::{DocumentRef, RemoteDocument, Timestamp};
use crate::error::{SyncError, SyncResult};
use crate::shapes::AssetId;
use crate::sync::{Clock, SystemClock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

#[derive(Debug, Clone)]
struct StoredDocument {
    content: String,
    updated_at: Timestamp,
}

/// In-memory backend for testing and offline use.
///
/// Counts every call, can hold persists in flight until released, and can
/// inject failures.
pub struct MemoryBackend {
    documents: RwLock<HashMap<DocumentRef, StoredDocument>>,
    assets: RwLock<HashMap<AssetId, Vec<u8>>>,
    clock: Arc<dyn Clock>,
    save_gate: watch::Sender<bool>,
    persist_failures: Mutex<VecDeque<SyncError>>,
    upload_failures: Mutex<VecDeque<SyncError>>,
    fetches: AtomicUsize,
    persists: AtomicUsize,
    polls: AtomicUsize,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (save_gate, _) = watch::channel(true);
        Self {
            documents: RwLock::new(HashMap::new()),
            assets: RwLock::new(HashMap::new()),
            clock,
            save_gate,
            persist_failures: Mutex::new(VecDeque::new()),
            upload_failures: Mutex::new(VecDeque::new()),
            fetches: AtomicUsize::new(0),
            persists: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Store a document as if written at `updated_at`.
    pub fn insert(&self, document: DocumentRef, content: impl Into<String>, updated_at: Timestamp) {
        let stored = StoredDocument {
            content: content.into(),
            updated_at,
        };
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document, stored);
    }

    /// Overwrite a document as another client would, stamped with the current time.
    pub fn simulate_remote_edit(&self, document: DocumentRef, content: impl Into<String>) {
        let now = self.clock.now();
        self.insert(document, content, now);
    }

    pub fn content(&self, document: DocumentRef) -> Option<String> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&document)
            .map(|doc| doc.content.clone())
    }

    pub fn updated_at(&self, document: DocumentRef) -> Option<Timestamp> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&document)
            .map(|doc| doc.updated_at)
    }

    /// Hold every persist at its start until [`MemoryBackend::release_saves`].
    pub fn hold_saves(&self) {
        self.save_gate.send_replace(false);
    }

    pub fn release_saves(&self) {
        self.save_gate.send_replace(true);
    }

    /// Make the next persist fail with `error`.
    pub fn fail_next_persist(&self, error: SyncError) {
        self.persist_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Make the next upload fail with `error`.
    pub fn fail_next_upload(&self, error: SyncError) {
        self.upload_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    pub fn asset(&self, id: &AssetId) -> Option<Vec<u8>> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of persists started, including ones still held or failed.
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

impl DocumentBackend for MemoryBackend {
    fn fetch(&self, document: DocumentRef) -> BoxFuture<'_, SyncResult<RemoteDocument>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let docs = self.documents.read().unwrap_or_else(PoisonError::into_inner);
            docs.get(&document)
                .map(|doc| RemoteDocument {
                    content: doc.content.clone(),
                    last_edit_time: Some(doc.updated_at),
                })
                .ok_or_else(|| SyncError::NotFound(document.to_string()))
        })
    }

    fn persist(&self, document: DocumentRef, content: String) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.persists.fetch_add(1, Ordering::SeqCst);

            let mut gate = self.save_gate.subscribe();
            if gate.wait_for(|open| *open).await.is_err() {
                return Err(SyncError::NetworkFailure("backend shut down".to_string()));
            }

            let failure = self
                .persist_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(error) = failure {
                return Err(error);
            }

            let now = self.clock.now();
            let mut docs = self.documents.write().unwrap_or_else(PoisonError::into_inner);
            match docs.get_mut(&document) {
                Some(doc) => {
                    doc.content = content;
                    doc.updated_at = now;
                    Ok(())
                }
                None => Err(SyncError::NotFound(document.to_string())),
            }
        })
    }

    fn last_update(&self, document: DocumentRef) -> BoxFuture<'_, SyncResult<Option<Timestamp>>> {
        Box::pin(async move {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let docs = self.documents.read().unwrap_or_else(PoisonError::into_inner);
            docs.get(&document)
                .map(|doc| Some(doc.updated_at))
                .ok_or_else(|| SyncError::NotFound(document.to_string()))
        })
    }
}

impl AssetStore for MemoryBackend {
    fn upload(&self, data: Vec<u8>, mime_type: &str) -> BoxFuture<'_, SyncResult<AssetId>> {
        let mime_type = mime_type.to_string();
        Box::pin(async move {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            let failure = self
                .upload_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(error) = failure {
                log::debug!("Refusing {} bytes of {mime_type}", data.len());
                return Err(error);
            }
            let id = AssetId::generate();
            self.assets
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.clone(), data);
            Ok(id)
        })
    }

    fn fetch_asset(&self, id: &AssetId) -> BoxFuture<'_, SyncResult<Vec<u8>>> {
        let id = id.clone();
        Box::pin(async move {
            self.asset(&id)
                .ok_or_else(|| SyncError::NotFound(format!("asset {id}")))
        })
    }

    fn delete_asset(&self, id: &AssetId) -> BoxFuture<'_, SyncResult<()>> {
        let id = id.clone();
        Box::pin(async move {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.assets
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| SyncError::NotFound(format!("asset {id}")))
        })
    }

    fn asset_url(&self, id: &AssetId) -> String {
        format!("memory://images/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ManualClock;

    #[tokio::test]
    async fn test_persist_and_fetch() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(10.0)));
        let backend = MemoryBackend::with_clock(clock.clone());
        let doc = DocumentRef::page(1);
        backend.insert(doc, "a", Timestamp::from_secs(1.0));

        clock.advance(std::time::Duration::from_secs(2));
        backend.persist(doc, "b".to_string()).await.unwrap();

        let remote = backend.fetch(doc).await.unwrap();
        assert_eq!(remote.content, "b");
        assert_eq!(remote.last_edit_time, Some(Timestamp::from_secs(12.0)));
        assert_eq!(
            backend.last_update(doc).await.unwrap(),
            Some(Timestamp::from_secs(12.0))
        );
        assert_eq!(backend.persist_count(), 1);
        assert_eq!(backend.fetch_count(), 1);
        assert_eq!(backend.poll_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let backend = MemoryBackend::new();
        let err = backend.fetch(DocumentRef::canvas(9)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let backend = MemoryBackend::new();
        let doc = DocumentRef::page(1);
        backend.insert(doc, "", Timestamp::EPOCH);
        backend.fail_next_persist(SyncError::NetworkFailure("down".into()));

        assert!(backend.persist(doc, "x".into()).await.is_err());
        assert!(backend.persist(doc, "x".into()).await.is_ok());
        assert_eq!(backend.content(doc).as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_assets() {
        let backend = MemoryBackend::new();
        let id = backend.upload(vec![1, 2, 3], "image/png").await.unwrap();
        assert_eq!(backend.fetch_asset(&id).await.unwrap(), vec![1, 2, 3]);
        backend.delete_asset(&id).await.unwrap();
        assert_eq!(backend.asset_count(), 0);

        backend.fail_next_upload(SyncError::UploadRejected("too large".into()));
        let err = backend.upload(vec![0], "image/png").await.unwrap_err();
        assert!(matches!(err, SyncError::UploadRejected(_)));
        assert!(backend.upload(vec![0], "image/png").await.is_ok());
    }
}
