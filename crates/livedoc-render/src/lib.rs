//! LiveDoc Render Library
//!
//! CPU export of canvases to PNG and PDF. Rendering is always at scale 1.0 in
//! document space, independent of any on-screen viewport.

mod assets;
mod export;
mod pdf;
mod raster;

pub use assets::{AssetResolver, fetch_assets};
pub use export::{ExportError, ExportOptions, ExportResult, export_pdf, export_png, png_data_url};
pub use raster::{Raster, rasterize};
