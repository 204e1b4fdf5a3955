//! Engine configuration.

use crate::history::DEFAULT_HISTORY_DEPTH;
use crate::shapes::CssColor;
use crate::tools::DEFAULT_STROKE_WIDTH;
use crate::viewport::DEFAULT_ZOOM_STEP;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration, usually loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sync: SyncConfig,
    pub canvas: CanvasConfig,
    pub backend: BackendConfig,
    pub preferences: Preferences,
}

impl EngineConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Timer settings for a sync session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before an autosave runs.
    pub debounce_ms: u64,
    /// Interval between remote update checks.
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            poll_interval_ms: 1000,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Poll period, never shorter than a millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Canvas surface defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub zoom_step: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub stroke_color: CssColor,
    pub stroke_width: f64,
    pub history_depth: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            zoom_step: DEFAULT_ZOOM_STEP,
            min_scale: 0.1,
            max_scale: 10.0,
            stroke_color: CssColor::black(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

/// Where the backend lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Color theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// User preferences passed to a surface at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
}

impl Preferences {
    pub fn dark() -> Self {
        Self { theme: Theme::Dark }
    }

    /// Background for a canvas that does not specify one.
    pub fn default_background(&self) -> CssColor {
        match self.theme {
            Theme::Dark => CssColor::black(),
            Theme::Light => CssColor::white(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sync.debounce(), Duration::from_millis(500));
        assert_eq!(config.sync.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.canvas.zoom_step, 1.05);
        assert_eq!(config.canvas.history_depth, 100);
        assert_eq!(config.canvas.stroke_color.as_str(), "#000000");
        assert_eq!(config.backend.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_partial_json() {
        let config =
            EngineConfig::from_json(r#"{"sync":{"debounce_ms":50},"canvas":{"stroke_width":2}}"#)
                .unwrap();
        assert_eq!(config.sync.debounce_ms, 50);
        assert_eq!(config.sync.poll_interval_ms, 1000);
        assert_eq!(config.canvas.stroke_width, 2.0);
        assert_eq!(config.canvas.max_scale, 10.0);
    }

    #[test]
    fn test_theme_background() {
        assert_eq!(Preferences::default().default_background().as_str(), "#ffffff");
        assert_eq!(Preferences::dark().default_background().as_str(), "#000000");
        let prefs: Preferences = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
    }
}
