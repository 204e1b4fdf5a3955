//! Image paste ingestion: sniff, measure, upload.

use crate::backend::AssetStore;
use crate::error::SyncResult;
use crate::shapes::{AssetId, ImageFormat};
use kurbo::Size;

/// One item of a clipboard paste.
#[derive(Debug, Clone, PartialEq)]
pub struct PasteItem {
    /// MIME type the clipboard claimed, if any.
    pub declared_type: Option<String>,
    pub data: Vec<u8>,
}

impl PasteItem {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            declared_type: None,
            data,
        }
    }

    pub fn with_type(declared_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            declared_type: Some(declared_type.into()),
            data,
        }
    }
}

/// An image that made it into the asset store.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedImage {
    pub asset_id: AssetId,
    pub format: ImageFormat,
    /// Pixel size, when the bytes could be decoded.
    pub natural_size: Option<Size>,
}

/// Classify a paste item by its bytes. Anything that is not a known image is ignored.
pub fn sniff(item: &PasteItem) -> Option<ImageFormat> {
    let format = ImageFormat::from_magic_bytes(&item.data);
    if format.is_none() {
        if let Some(declared) = item.declared_type.as_deref().filter(|t| t.starts_with("image/")) {
            log::warn!("Ignoring paste item declared as {declared} with unrecognised contents");
        }
    }
    format
}

/// Pixel dimensions of encoded image bytes.
pub fn natural_size(data: &[u8]) -> Option<Size> {
    match image::load_from_memory(data) {
        Ok(decoded) => Some(Size::new(decoded.width() as f64, decoded.height() as f64)),
        Err(err) => {
            log::debug!("Could not measure pasted image: {err}");
            None
        }
    }
}

/// Upload one paste item.
///
/// Returns `None` for items that are not images.
pub async fn ingest_item<S>(store: &S, item: PasteItem) -> Option<SyncResult<IngestedImage>>
where
    S: AssetStore + ?Sized,
{
    let format = sniff(&item)?;
    let natural_size = natural_size(&item.data);
    let bytes = item.data.len();

    let result = store.upload(item.data, format.mime_type()).await;
    Some(match result {
        Ok(asset_id) => {
            log::info!("Uploaded {bytes} byte {} as asset {asset_id}", format.mime_type());
            Ok(IngestedImage {
                asset_id,
                format,
                natural_size,
            })
        }
        Err(err) => {
            log::warn!("Image upload failed: {err}");
            Err(err)
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::SyncError;
    use std::io::Cursor;

    /// Encode a blank PNG of the given size.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_sniff_and_measure() {
        let png = png_bytes(30, 20);
        let item = PasteItem::with_type("image/png", png.clone());
        assert_eq!(sniff(&item), Some(ImageFormat::Png));
        assert_eq!(natural_size(&png), Some(Size::new(30.0, 20.0)));

        let text = PasteItem::with_type("text/plain", b"hello there".to_vec());
        assert_eq!(sniff(&text), None);
    }

    #[tokio::test]
    async fn test_ingest_uploads_images_only() {
        let store = MemoryBackend::new();

        let ingested = ingest_item(&store, PasteItem::new(png_bytes(4, 4)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ingested.format, ImageFormat::Png);
        assert_eq!(ingested.natural_size, Some(Size::new(4.0, 4.0)));
        assert!(store.asset(&ingested.asset_id).is_some());

        assert!(ingest_item(&store, PasteItem::new(b"plain".to_vec())).await.is_none());
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_upload_is_reported() {
        let store = MemoryBackend::new();
        store.fail_next_upload(SyncError::UploadRejected("quota".into()));
        let result = ingest_item(&store, PasteItem::new(png_bytes(2, 2))).await.unwrap();
        assert!(matches!(result, Err(SyncError::UploadRejected(_))));
        assert_eq!(store.asset_count(), 0);
    }
}
