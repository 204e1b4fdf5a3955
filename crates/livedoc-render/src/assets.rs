//! Asset bytes for export.

use livedoc_core::canvas::CanvasDocument;
use livedoc_core::shapes::AssetId;
use livedoc_core::AssetStore;
use std::collections::HashMap;

/// Source of encoded image bytes by asset id.
pub trait AssetResolver {
    fn resolve(&self, id: &AssetId) -> Option<&[u8]>;
}

impl AssetResolver for HashMap<AssetId, Vec<u8>> {
    fn resolve(&self, id: &AssetId) -> Option<&[u8]> {
        self.get(id).map(Vec::as_slice)
    }
}

/// Resolves nothing; every image is skipped.
impl AssetResolver for () {
    fn resolve(&self, _id: &AssetId) -> Option<&[u8]> {
        None
    }
}

/// Download every asset the document places. Failures are logged and left out.
pub async fn fetch_assets<S>(store: &S, document: &CanvasDocument) -> HashMap<AssetId, Vec<u8>>
where
    S: AssetStore + ?Sized,
{
    let mut assets = HashMap::new();
    for image in &document.images {
        if assets.contains_key(&image.asset_id) {
            continue;
        }
        match store.fetch_asset(&image.asset_id).await {
            Ok(bytes) => {
                assets.insert(image.asset_id.clone(), bytes);
            }
            Err(err) => log::warn!("Skipping asset {}: {err}", image.asset_id),
        }
    }
    assets
}
