//! Freehand strokes.

use super::CssColor;
use super::image::{JsNumber, js_number};
use kurbo::{BezPath, Point, Rect};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Color the eraser paints with. Older payloads mark erase strokes only by this color.
pub const ERASER_COLOR: &str = "#f0f0f0";

/// How a stroke combines with what was drawn before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMode {
    /// Paint over earlier strokes.
    #[default]
    Draw,
    /// Clear earlier strokes, revealing the background.
    Erase,
}

/// A freehand stroke: an ordered run of document-space points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Points in document space, stored on the wire as `[x0, y0, x1, y1, ...]`.
    #[serde(with = "flat_points")]
    pub points: Vec<Point>,
    /// Stroke color.
    pub stroke: CssColor,
    /// Stroke width in document units.
    #[serde(rename = "strokeWidth", with = "js_number")]
    pub stroke_width: f64,
    /// Explicit composite mode. Absent on payloads written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeMode>,
    /// Fields written by other clients that this model does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Stroke {
    /// Open a new stroke at `start`.
    pub fn new(start: Point, stroke: CssColor, stroke_width: f64, mode: CompositeMode) -> Self {
        Self {
            points: vec![start],
            stroke,
            stroke_width,
            composite: Some(mode),
            extra: Map::new(),
        }
    }

    /// Create from existing points.
    pub fn from_points(points: Vec<Point>, stroke: CssColor, stroke_width: f64) -> Self {
        Self {
            points,
            stroke,
            stroke_width,
            composite: Some(CompositeMode::Draw),
            extra: Map::new(),
        }
    }

    /// Add a point to the path.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Effective composite mode, inferring erase from the eraser color when unset.
    pub fn mode(&self) -> CompositeMode {
        match self.composite {
            Some(mode) => mode,
            None if self.stroke.matches(ERASER_COLOR) => CompositeMode::Erase,
            None => CompositeMode::Draw,
        }
    }

    pub fn is_erase(&self) -> bool {
        self.mode() == CompositeMode::Erase
    }

    /// Bounding box including half the stroke width on every side.
    pub fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };

        let mut rect = Rect::from_points(*first, *first);
        for point in &self.points[1..] {
            rect = rect.union_pt(*point);
        }
        let half = self.stroke_width / 2.0;
        rect.inflate(half, half)
    }

    /// Smoothed path through the points (Catmull-Rom with tension 0.5, as cubics).
    ///
    /// A single-point stroke yields a zero-length segment so round caps still
    /// render a dot.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let points = &self.points;

        match points.len() {
            0 => return path,
            1 => {
                path.move_to(points[0]);
                path.line_to(points[0]);
                return path;
            }
            _ => {}
        }

        let tension = 0.5;
        path.move_to(points[0]);
        for i in 0..points.len() - 1 {
            let p0 = points[i.saturating_sub(1)];
            let p1 = points[i];
            let p2 = points[i + 1];
            let p3 = points[(i + 2).min(points.len() - 1)];

            let t1 = (p2 - p0) * tension;
            let t2 = (p3 - p1) * tension;

            let cp1 = p1 + t1 / 3.0;
            let cp2 = p2 - t2 / 3.0;
            path.curve_to(cp1, cp2, p2);
        }
        path
    }
}

/// Serde adapter between `Vec<Point>` and a flat `[x, y, x, y, ...]` array.
mod flat_points {
    use super::*;
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(points: &[Point], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len() * 2))?;
        for point in points {
            seq.serialize_element(&JsNumber(point.x))?;
            seq.serialize_element(&JsNumber(point.y))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Point>, D::Error> {
        let flat = Vec::<f64>::deserialize(deserializer)?;
        if flat.len() % 2 != 0 {
            return Err(D::Error::custom(format!(
                "point list has odd length {}",
                flat.len()
            )));
        }
        Ok(flat
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::PathEl;

    #[test]
    fn test_add_points() {
        let mut stroke = Stroke::new(Point::ZERO, CssColor::black(), 4.0, CompositeMode::Draw);
        stroke.add_point(Point::new(10.0, 10.0));
        assert_eq!(stroke.len(), 2);
        assert!(!stroke.is_erase());
    }

    #[test]
    fn test_bounds_include_width() {
        let stroke = Stroke::from_points(
            vec![Point::new(0.0, 0.0), Point::new(100.0, 50.0), Point::new(50.0, 100.0)],
            CssColor::black(),
            4.0,
        );
        let bounds = stroke.bounds();
        assert_eq!(bounds, Rect::new(-2.0, -2.0, 102.0, 102.0));
    }

    #[test]
    fn test_flat_point_wire_format() {
        let stroke = Stroke::from_points(
            vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)],
            CssColor::new("#ff0000"),
            4.0,
        );
        let json = serde_json::to_value(&stroke).unwrap();
        assert_eq!(json["points"], serde_json::json!([1, 2, 3.5, 4]));
        assert_eq!(json["strokeWidth"], serde_json::json!(4));
        assert_eq!(json["composite"], "draw");
    }

    #[test]
    fn test_legacy_eraser_is_inferred() {
        let json = r##"{"points":[0,0,5,5],"stroke":"#f0f0f0","strokeWidth":10,"tension":0.5}"##;
        let stroke: Stroke = serde_json::from_str(json).unwrap();
        assert_eq!(stroke.mode(), CompositeMode::Erase);
        assert_eq!(stroke.composite, None);
        assert_eq!(stroke.extra["tension"], serde_json::json!(0.5));

        // Re-serializing neither invents a composite field nor drops unknown ones.
        let back = serde_json::to_value(&stroke).unwrap();
        assert!(back.get("composite").is_none());
        assert_eq!(back["tension"], serde_json::json!(0.5));
    }

    #[test]
    fn test_odd_point_list_rejected() {
        let json = r##"{"points":[0,0,5],"stroke":"#000","strokeWidth":1}"##;
        assert!(serde_json::from_str::<Stroke>(json).is_err());
    }

    #[test]
    fn test_path_passes_through_points() {
        let stroke = Stroke::from_points(
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(20.0, 10.0)],
            CssColor::black(),
            2.0,
        );
        let path = stroke.to_path();
        let ends: Vec<Point> = path
            .elements()
            .iter()
            .filter_map(|el| match el {
                PathEl::MoveTo(p) | PathEl::CurveTo(_, _, p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(ends, stroke.points);
    }
}
