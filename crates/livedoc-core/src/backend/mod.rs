//! Remote document and asset stores.

mod http;
mod memory;
mod wire;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::document::{DocumentRef, RemoteDocument, Timestamp};
use crate::error::SyncResult;
use crate::shapes::AssetId;
use std::future::Future;
use std::pin::Pin;

/// Boxed future for backend operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where documents live.
///
/// Implementations can talk to the project REST API or keep everything in memory.
pub trait DocumentBackend: Send + Sync + 'static {
    /// Load the current content.
    fn fetch(&self, document: DocumentRef) -> BoxFuture<'_, SyncResult<RemoteDocument>>;

    /// Overwrite the stored content.
    fn persist(&self, document: DocumentRef, content: String) -> BoxFuture<'_, SyncResult<()>>;

    /// When the stored content last changed, or `None` if the server does not know.
    fn last_update(&self, document: DocumentRef) -> BoxFuture<'_, SyncResult<Option<Timestamp>>>;
}

/// Where pasted images live.
pub trait AssetStore: Send + Sync + 'static {
    /// Store image bytes and return their id.
    fn upload(&self, data: Vec<u8>, mime_type: &str) -> BoxFuture<'_, SyncResult<AssetId>>;

    /// Load image bytes.
    fn fetch_asset(&self, id: &AssetId) -> BoxFuture<'_, SyncResult<Vec<u8>>>;

    /// Remove an image.
    fn delete_asset(&self, id: &AssetId) -> BoxFuture<'_, SyncResult<()>>;

    /// URL under which the asset is served, for markdown references.
    fn asset_url(&self, id: &AssetId) -> String;
}
