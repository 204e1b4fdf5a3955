//! Drawable objects owned by a canvas document.

mod image;
mod stroke;

pub use image::{AssetId, ImageFormat, PlacedImage};
pub use stroke::{CompositeMode, Stroke, ERASER_COLOR};

use serde::{Deserialize, Serialize};
use std::fmt;

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);
    pub const WHITE: Rgba8 = Rgba8::new(255, 255, 255, 255);
    pub const TRANSPARENT: Rgba8 = Rgba8::new(0, 0, 0, 0);
}

/// A color as written in the stored payload (`"#rrggbb"`, `"#rgb"`, `"#rrggbbaa"`
/// or a handful of CSS keywords).
///
/// The original text is kept verbatim so that content written by other clients
/// serializes back unchanged; it is only parsed when something needs pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CssColor(String);

impl CssColor {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Build a `#rrggbb` color from components.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(format!("#{r:02x}{g:02x}{b:02x}"))
    }

    pub fn black() -> Self {
        Self::new("#000000")
    }

    pub fn white() -> Self {
        Self::new("#ffffff")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against another color string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.trim().eq_ignore_ascii_case(other.trim())
    }

    /// Parse into RGBA components. Returns `None` for unrecognised syntax.
    pub fn to_rgba8(&self) -> Option<Rgba8> {
        let text = self.0.trim();
        match text.to_ascii_lowercase().as_str() {
            "black" => return Some(Rgba8::BLACK),
            "white" => return Some(Rgba8::WHITE),
            "transparent" => return Some(Rgba8::TRANSPARENT),
            _ => {}
        }

        let hex = text.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => Some(Rgba8::new(
                channel(&hex[0..1])? * 17,
                channel(&hex[1..2])? * 17,
                channel(&hex[2..3])? * 17,
                255,
            )),
            6 => Some(Rgba8::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Rgba8::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }
}

impl Default for CssColor {
    fn default() -> Self {
        Self::black()
    }
}

impl fmt::Display for CssColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CssColor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
