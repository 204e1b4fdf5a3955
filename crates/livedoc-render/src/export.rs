//! PNG and PDF export.

use crate::assets::AssetResolver;
use crate::pdf;
use crate::raster::rasterize;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kurbo::Rect;
use livedoc_core::canvas::CanvasDocument;
use thiserror::Error;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Nothing to export: the canvas is empty")]
    EmptyCanvas,
    #[error("Invalid export size {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },
    #[error("Failed to allocate a {width}x{height} raster")]
    Allocation { width: u32, height: u32 },
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("PDF encoding failed: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// What part of the canvas to export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Margin added around the content bounds, in document units.
    pub padding: f64,
    /// Export exactly this document-space rectangle instead of the content bounds.
    pub region: Option<Rect>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            padding: 20.0,
            region: None,
        }
    }
}

/// Render the canvas to PNG bytes.
///
/// Export reads the document only; it never changes it or saves it.
pub fn export_png<R>(
    document: &CanvasDocument,
    assets: &R,
    options: &ExportOptions,
) -> ExportResult<Vec<u8>>
where
    R: AssetResolver + ?Sized,
{
    let raster = rasterize(document, assets, options)?;
    let png = encode_png(&raster.to_rgba8(), raster.width(), raster.height())?;
    log::info!(
        "PNG export complete: {}x{}, {} bytes",
        raster.width(),
        raster.height(),
        png.len()
    );
    Ok(png)
}

/// Render the canvas to a single-page PDF sized to the raster.
pub fn export_pdf<R>(
    document: &CanvasDocument,
    assets: &R,
    options: &ExportOptions,
) -> ExportResult<Vec<u8>>
where
    R: AssetResolver + ?Sized,
{
    let raster = rasterize(document, assets, options)?;
    let bytes = pdf::encode_pdf(raster.to_rgb8(), raster.width(), raster.height())?;
    log::info!(
        "PDF export complete: {}x{} pt, {} bytes",
        raster.width(),
        raster.height(),
        bytes.len()
    );
    Ok(bytes)
}

/// `data:` URL for PNG bytes.
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Encode RGBA pixel data to PNG bytes.
fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> ExportResult<Vec<u8>> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba_data)?;
    }
    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use livedoc_core::shapes::{CssColor, Stroke};

    fn doodle() -> CanvasDocument {
        let mut doc = CanvasDocument::with_background(CssColor::new("#102030"));
        doc.lines.push(Stroke::from_points(
            vec![Point::new(0.0, 0.0), Point::new(30.0, 10.0), Point::new(60.0, 0.0)],
            CssColor::new("#ff8800"),
            4.0,
        ));
        doc
    }

    #[test]
    fn test_png_decodes_to_raster_size() {
        let doc = doodle();
        let before = doc.clone();
        let png = export_png(&doc, &(), &ExportOptions::default()).unwrap();
        assert_eq!(doc, before);

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        let raster = rasterize(&doc, &(), &ExportOptions::default()).unwrap();
        assert_eq!(decoded.dimensions(), (raster.width(), raster.height()));
        // Corners are background.
        assert_eq!(decoded.get_pixel(0, 0).0, [0x10, 0x20, 0x30, 0xff]);
    }

    #[test]
    fn test_pdf_export() {
        let pdf = export_pdf(&doodle(), &(), &ExportOptions::default()).unwrap();
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_empty_canvas_is_an_error() {
        let err = export_png(&CanvasDocument::default(), &(), &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, ExportError::EmptyCanvas));
    }

    #[test]
    fn test_data_url() {
        assert_eq!(png_data_url(&[1, 2, 3]), "data:image/png;base64,AQID");
    }
}
