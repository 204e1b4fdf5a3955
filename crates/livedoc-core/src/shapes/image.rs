//! Raster images placed on a canvas.

use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of an image held by the asset store.
///
/// Some servers hand out numeric ids and others strings; the original form is
/// remembered so the id serializes back the way it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId {
    raw: String,
    numeric: bool,
}

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            raw: id.into(),
            numeric: false,
        }
    }

    pub fn from_number(id: u64) -> Self {
        Self {
            raw: id.to_string(),
            numeric: true,
        }
    }

    /// Fresh random id, used by in-memory stores.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.raw.parse::<u64>() {
            Ok(n) if self.numeric => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&self.raw),
        }
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => AssetId::from_number(n),
            Raw::Text(s) => AssetId::new(s),
        })
    }
}

/// Image format detected from asset bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
}

impl ImageFormat {
    /// Get MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// File extension used when uploading.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
        }
    }

    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(ImageFormat::Gif);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        None
    }
}

/// An image placed on a canvas by reference to a stored asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedImage {
    #[serde(rename = "id")]
    pub asset_id: AssetId,
    /// Top-left corner, document space.
    #[serde(with = "js_number")]
    pub x: f64,
    #[serde(with = "js_number")]
    pub y: f64,
    #[serde(rename = "scaleX", default = "unit_scale", with = "js_number")]
    pub scale_x: f64,
    #[serde(rename = "scaleY", default = "unit_scale", with = "js_number")]
    pub scale_y: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unit_scale() -> f64 {
    1.0
}

impl PlacedImage {
    pub fn new(asset_id: AssetId, position: Point) -> Self {
        Self {
            asset_id,
            x: position.x,
            y: position.y,
            scale_x: 1.0,
            scale_y: 1.0,
            extra: Map::new(),
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Point) {
        self.x = position.x;
        self.y = position.y;
    }

    /// Displayed size for an image whose pixels measure `natural`.
    pub fn display_size(&self, natural: Size) -> Size {
        Size::new(natural.width * self.scale_x, natural.height * self.scale_y)
    }

    /// Document-space bounds, normalized for negative scales.
    pub fn bounds(&self, natural: Size) -> Rect {
        let size = self.display_size(natural);
        Rect::new(self.x, self.y, self.x + size.width, self.y + size.height).abs()
    }

    pub fn hit_test(&self, point: Point, natural: Size) -> bool {
        self.bounds(natural).contains(point)
    }
}

/// A float that serializes without a trailing `.0` when it is integral,
/// matching what JavaScript clients write.
pub(crate) struct JsNumber(pub f64);

impl Serialize for JsNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
        let value = self.0;
        if value.fract() == 0.0 && value.abs() < MAX_EXACT {
            serializer.serialize_i64(value as i64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

pub(crate) mod js_number {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        JsNumber(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF89a.."), Some(ImageFormat::Gif));
        assert_eq!(
            ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"hello world"), None);
        assert_eq!(ImageFormat::from_magic_bytes(&[0x89]), None);
    }

    #[test]
    fn test_wire_defaults_and_extras() {
        let json = r#"{"id":42,"x":10,"y":20.5,"rotation":15}"#;
        let image: PlacedImage = serde_json::from_str(json).unwrap();
        assert_eq!(image.asset_id.as_str(), "42");
        assert_eq!(image.scale_x, 1.0);
        assert_eq!(image.scale_y, 1.0);

        let back = serde_json::to_value(&image).unwrap();
        assert_eq!(back["id"], serde_json::json!(42));
        assert_eq!(back["x"], serde_json::json!(10));
        assert_eq!(back["y"], serde_json::json!(20.5));
        assert_eq!(back["rotation"], serde_json::json!(15));
    }

    #[test]
    fn test_string_ids_stay_strings() {
        let image: PlacedImage = serde_json::from_str(r#"{"id":"7","x":0,"y":0}"#).unwrap();
        assert_eq!(serde_json::to_value(&image).unwrap()["id"], "7");
    }

    #[test]
    fn test_hit_test_uses_scale() {
        let mut image = PlacedImage::new(AssetId::new("a"), Point::new(100.0, 100.0));
        image.scale_x = 2.0;
        image.scale_y = 0.5;
        let natural = Size::new(50.0, 40.0);
        assert_eq!(image.bounds(natural), Rect::new(100.0, 100.0, 200.0, 120.0));
        assert!(image.hit_test(Point::new(190.0, 110.0), natural));
        assert!(!image.hit_test(Point::new(190.0, 130.0), natural));
    }
}
