//! Screen/document mapping for a drawing surface.
//!
//! `screen = document * scale + translate`. A viewport is per-session state and
//! is never persisted.

use kurbo::{Point, Vec2};

/// Multiplicative step applied per wheel notch.
pub const DEFAULT_ZOOM_STEP: f64 = 1.05;

/// Uniform scale plus screen-space translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Always positive.
    pub scale: f64,
    /// Screen pixels.
    pub translate: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Bounds and step for wheel zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min_scale: f64,
    pub max_scale: f64,
    pub step: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 10.0,
            step: DEFAULT_ZOOM_STEP,
        }
    }
}

impl ZoomLimits {
    /// Next scale for a wheel delta: `> 0` zooms out, `< 0` zooms in, `0` keeps it.
    pub fn step_scale(&self, scale: f64, delta_y: f64) -> f64 {
        let next = if delta_y > 0.0 {
            scale / self.step
        } else if delta_y < 0.0 {
            scale * self.step
        } else {
            scale
        };
        next.clamp(self.min_scale, self.max_scale)
    }
}

pub fn to_document_space(screen: Point, viewport: &Viewport) -> Point {
    ((screen.to_vec2() - viewport.translate) / viewport.scale).to_point()
}

pub fn to_screen_space(document: Point, viewport: &Viewport) -> Point {
    (document.to_vec2() * viewport.scale + viewport.translate).to_point()
}

impl Viewport {
    pub const IDENTITY: Viewport = Viewport {
        scale: 1.0,
        translate: Vec2::ZERO,
    };

    pub fn to_document_space(&self, screen: Point) -> Point {
        to_document_space(screen, self)
    }

    pub fn to_screen_space(&self, document: Point) -> Point {
        to_screen_space(document, self)
    }

    /// Add a screen-space pointer delta to the translation.
    pub fn pan(&mut self, delta: Vec2) {
        self.translate += delta;
    }

    /// Wheel zoom anchored at `pointer`: the document point under the pointer
    /// before rescaling is still under it afterwards.
    pub fn zoom_at_pointer(&mut self, pointer: Point, delta_y: f64, limits: &ZoomLimits) {
        let anchor = self.to_document_space(pointer);
        let scale = limits.step_scale(self.scale, delta_y);
        if scale == self.scale {
            return;
        }
        self.scale = scale;
        self.translate = pointer.to_vec2() - anchor.to_vec2() * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point, eps: f64) {
        assert!((a.x - b.x).abs() < eps, "{a:?} vs {b:?}");
        assert!((a.y - b.y).abs() < eps, "{a:?} vs {b:?}");
    }

    #[test]
    fn test_mapping() {
        let p = Point::new(100.0, 200.0);
        assert_eq!(to_document_space(p, &Viewport::IDENTITY), p);

        let viewport = Viewport {
            scale: 2.0,
            translate: Vec2::new(50.0, 100.0),
        };
        assert_eq!(
            to_document_space(Point::new(150.0, 300.0), &viewport),
            Point::new(50.0, 100.0)
        );
        assert_eq!(
            to_screen_space(Point::new(50.0, 100.0), &viewport),
            Point::new(150.0, 300.0)
        );
    }

    #[test]
    fn test_inverse_over_many_viewports() {
        // Deterministic xorshift sweep.
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 10_000) as f64 / 10_000.0
        };

        for _ in 0..500 {
            let viewport = Viewport {
                scale: 0.1 + next() * 9.9,
                translate: Vec2::new(next() * 4000.0 - 2000.0, next() * 4000.0 - 2000.0),
            };
            let p = Point::new(next() * 10_000.0 - 5000.0, next() * 10_000.0 - 5000.0);
            let back = to_document_space(to_screen_space(p, &viewport), &viewport);
            assert_close(back, p, 1e-6);
        }
    }

    #[test]
    fn test_zoom_keeps_point_under_pointer() {
        let limits = ZoomLimits::default();
        let mut viewport = Viewport {
            scale: 1.3,
            translate: Vec2::new(-30.0, 12.0),
        };
        let pointer = Point::new(412.0, 233.0);

        for delta in [-1.0, -1.0, 3.0, -2.0, 1.0] {
            let before = viewport.to_document_space(pointer);
            viewport.zoom_at_pointer(pointer, delta, &limits);
            assert_close(viewport.to_document_space(pointer), before, 1e-9);
        }
    }

    #[test]
    fn test_wheel_direction_and_clamp() {
        let limits = ZoomLimits::default();
        assert!((limits.step_scale(1.0, -1.0) - DEFAULT_ZOOM_STEP).abs() < 1e-12);
        assert!((limits.step_scale(1.0, 4.0) - 1.0 / DEFAULT_ZOOM_STEP).abs() < 1e-12);
        assert_eq!(limits.step_scale(1.0, 0.0), 1.0);
        assert_eq!(limits.step_scale(10.0, -1.0), 10.0);
        assert_eq!(limits.step_scale(0.1, 1.0), 0.1);

        let mut viewport = Viewport::IDENTITY;
        viewport.scale = 10.0;
        viewport.zoom_at_pointer(Point::new(5.0, 5.0), -1.0, &limits);
        assert_eq!(viewport.translate, Vec2::ZERO);
    }

    #[test]
    fn test_pan_adds_delta() {
        let mut viewport = Viewport::default();
        viewport.pan(Vec2::new(10.0, 20.0));
        viewport.pan(Vec2::new(-4.0, 1.0));
        assert_eq!(viewport.translate, Vec2::new(6.0, 21.0));
        assert_eq!(viewport.scale, 1.0);
    }
}
