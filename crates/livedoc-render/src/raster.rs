//! Software rasterizer for canvas documents.

use crate::assets::AssetResolver;
use crate::export::{ExportError, ExportOptions, ExportResult};
use kurbo::{BezPath, PathEl, Rect, Size};
use livedoc_core::canvas::CanvasDocument;
use livedoc_core::shapes::{AssetId, Rgba8, Stroke};
use std::collections::HashMap;
use tiny_skia::{
    BlendMode, Color, ColorU8, FillRule, FilterQuality, LineCap, LineJoin, Paint, PathBuilder,
    Pixmap, PixmapPaint, Transform,
};

/// Largest width or height we agree to allocate.
const MAX_DIMENSION: u32 = 16_384;

/// A rendered canvas region.
pub struct Raster {
    pixmap: Pixmap,
    region: Rect,
}

impl Raster {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Document-space rectangle covered by the raster, snapped to whole pixels.
    pub fn region(&self) -> Rect {
        self.region
    }

    /// Straight-alpha RGBA pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Rgba8::new(c.red(), c.green(), c.blue(), c.alpha()))
    }

    /// Straight-alpha RGBA rows, top to bottom.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect()
    }

    /// Opaque RGB rows, flattened over white.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.to_rgba8()
            .chunks_exact(4)
            .flat_map(|px| {
                let a = px[3] as u32;
                let over_white = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
                [over_white(px[0]), over_white(px[1]), over_white(px[2])]
            })
            .collect()
    }
}

/// Render `document` at scale 1.0.
///
/// Strokes are drawn in order on their own layer so that erase strokes only
/// remove earlier ink. The layer is composited over the background and placed
/// images are drawn on top. Images whose bytes cannot be resolved or decoded
/// are skipped.
pub fn rasterize<R>(
    document: &CanvasDocument,
    assets: &R,
    options: &ExportOptions,
) -> ExportResult<Raster>
where
    R: AssetResolver + ?Sized,
{
    let images = decode_images(document, assets);
    let region = export_region(document, &images, options)?;
    let (width, height) = pixel_size(region)?;
    let origin = Transform::from_translate(-region.x0 as f32, -region.y0 as f32);

    let mut ink = Pixmap::new(width, height).ok_or(ExportError::Allocation { width, height })?;
    for line in &document.lines {
        draw_stroke(&mut ink, line, origin);
    }

    let mut canvas =
        Pixmap::new(width, height).ok_or(ExportError::Allocation { width, height })?;
    canvas.fill(background(document));
    canvas.draw_pixmap(
        0,
        0,
        ink.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    for image in &document.images {
        let Some(pixmap) = images.get(&image.asset_id) else {
            continue;
        };
        let transform = Transform::from_row(
            image.scale_x as f32,
            0.0,
            0.0,
            image.scale_y as f32,
            (image.x - region.x0) as f32,
            (image.y - region.y0) as f32,
        );
        canvas.draw_pixmap(0, 0, pixmap.as_ref(), &paint, transform, None);
    }

    log::debug!(
        "Rasterized {} strokes and {} images into {width}x{height}",
        document.lines.len(),
        document.images.len()
    );
    Ok(Raster {
        pixmap: canvas,
        region,
    })
}

fn export_region(
    document: &CanvasDocument,
    images: &HashMap<AssetId, Pixmap>,
    options: &ExportOptions,
) -> ExportResult<Rect> {
    let region = match options.region {
        Some(region) => region,
        None => document
            .content_bounds(|id| {
                images
                    .get(id)
                    .map(|p| Size::new(p.width() as f64, p.height() as f64))
            })
            .ok_or(ExportError::EmptyCanvas)?
            .inflate(options.padding, options.padding),
    };
    Ok(Rect::new(
        region.x0.floor(),
        region.y0.floor(),
        region.x1.ceil(),
        region.y1.ceil(),
    ))
}

fn pixel_size(region: Rect) -> ExportResult<(u32, u32)> {
    let (width, height) = (region.width(), region.height());
    let max = MAX_DIMENSION as f64;
    if !(width >= 1.0 && height >= 1.0 && width <= max && height <= max) {
        return Err(ExportError::InvalidDimensions { width, height });
    }
    Ok((width as u32, height as u32))
}

fn background(document: &CanvasDocument) -> Color {
    let rgba = document.background_color.to_rgba8().unwrap_or_else(|| {
        log::warn!(
            "Unreadable background {:?}, exporting on white",
            document.background_color.as_str()
        );
        Rgba8::WHITE
    });
    Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}

fn draw_stroke(ink: &mut Pixmap, line: &Stroke, transform: Transform) {
    if line.is_empty() {
        return;
    }

    let mut paint = Paint {
        anti_alias: true,
        ..Paint::default()
    };
    if line.is_erase() {
        paint.blend_mode = BlendMode::DestinationOut;
        paint.set_color(Color::BLACK);
    } else {
        let rgba = line.stroke.to_rgba8().unwrap_or(Rgba8::BLACK);
        paint.set_color_rgba8(rgba.r, rgba.g, rgba.b, rgba.a);
    }

    let width = line.stroke_width.max(0.0) as f32;
    if line.len() == 1 {
        let p = line.points[0];
        if let Some(dot) = PathBuilder::from_circle(p.x as f32, p.y as f32, width / 2.0) {
            ink.fill_path(&dot, &paint, FillRule::Winding, transform, None);
        }
        return;
    }

    let Some(path) = to_skia_path(&line.to_path()) else {
        return;
    };
    let stroke = tiny_skia::Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..tiny_skia::Stroke::default()
    };
    ink.stroke_path(&path, &paint, &stroke, transform, None);
}

fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for element in path.elements() {
        match *element {
            PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(a, b) => builder.quad_to(a.x as f32, a.y as f32, b.x as f32, b.y as f32),
            PathEl::CurveTo(a, b, c) => builder.cubic_to(
                a.x as f32, a.y as f32, b.x as f32, b.y as f32, c.x as f32, c.y as f32,
            ),
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

/// Decode each distinct placed asset once.
fn decode_images<R>(document: &CanvasDocument, assets: &R) -> HashMap<AssetId, Pixmap>
where
    R: AssetResolver + ?Sized,
{
    let mut decoded = HashMap::new();
    for image in &document.images {
        let id = &image.asset_id;
        if decoded.contains_key(id) {
            continue;
        }
        let Some(bytes) = assets.resolve(id) else {
            log::warn!("Asset {id} is not available, skipping it");
            continue;
        };
        match image::load_from_memory(bytes) {
            Ok(img) => match to_pixmap(&img.to_rgba8()) {
                Some(pixmap) => {
                    decoded.insert(id.clone(), pixmap);
                }
                None => log::warn!("Asset {id} has an empty image, skipping it"),
            },
            Err(err) => log::warn!("Could not decode asset {id}: {err}"),
        }
    }
    decoded
}

fn to_pixmap(image: &image::RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}
