//! Tool system for the canvas.

use crate::shapes::{CompositeMode, CssColor, ERASER_COLOR, Stroke};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Default stroke width for new strokes.
pub const DEFAULT_STROKE_WIDTH: f64 = 4.0;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Pen,
    Eraser,
    Pan,
}

/// State of a tool interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ToolState {
    /// Waiting for a pointer press.
    #[default]
    Idle,
    /// A stroke is being drawn. It is not part of the document until released.
    Drawing { stroke: Stroke },
    /// The viewport follows the pointer.
    Panning {
        /// Last pointer position, screen space.
        anchor: Point,
        /// Tool to restore on release when the pan was forced by an alternate button.
        restore: Option<ToolKind>,
    },
    /// A placed image follows the pointer.
    DraggingImage {
        index: usize,
        /// Last pointer position, document space.
        last: Point,
        /// Image position when the drag began.
        origin: Point,
    },
}

/// Result of finishing a drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragOutcome {
    pub index: usize,
    pub origin: Point,
}

/// Manages the current tool and its state.
#[derive(Debug, Clone)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    /// Current state of the tool.
    pub state: ToolState,
    /// Color for new pen strokes.
    pub stroke_color: CssColor,
    /// Width for new strokes, both pen and eraser.
    pub stroke_width: f64,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self {
            current_tool: ToolKind::default(),
            state: ToolState::default(),
            stroke_color: CssColor::black(),
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(stroke_color: CssColor, stroke_width: f64) -> Self {
        Self {
            stroke_color,
            stroke_width,
            ..Self::default()
        }
    }

    /// Set the current tool. Any ongoing interaction is abandoned.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
        self.state = ToolState::Idle;
    }

    /// Whether a pointer interaction is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, ToolState::Idle)
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, ToolState::Drawing { .. })
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.state, ToolState::Panning { .. })
    }

    /// The stroke being drawn, if any.
    pub fn preview_stroke(&self) -> Option<&Stroke> {
        match &self.state {
            ToolState::Drawing { stroke } => Some(stroke),
            _ => None,
        }
    }

    /// Open a stroke at `point` (document space) with the current settings.
    pub fn begin_stroke(&mut self, point: Point) {
        let (color, mode) = match self.current_tool {
            ToolKind::Eraser => (CssColor::new(ERASER_COLOR), CompositeMode::Erase),
            _ => (self.stroke_color.clone(), CompositeMode::Draw),
        };
        self.state = ToolState::Drawing {
            stroke: Stroke::new(point, color, self.stroke_width, mode),
        };
    }

    /// Append a point to the open stroke.
    pub fn extend_stroke(&mut self, point: Point) {
        if let ToolState::Drawing { stroke } = &mut self.state {
            stroke.add_point(point);
        }
    }

    /// Close the open stroke and hand it back for committing.
    pub fn finish_stroke(&mut self) -> Option<Stroke> {
        match std::mem::take(&mut self.state) {
            ToolState::Drawing { stroke } => Some(stroke),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Start panning from `anchor` (screen space).
    ///
    /// A forced pan remembers the selected tool and switches to `Pan` until released.
    pub fn begin_pan(&mut self, anchor: Point, forced: bool) {
        let restore = if forced && self.current_tool != ToolKind::Pan {
            let previous = self.current_tool;
            self.current_tool = ToolKind::Pan;
            Some(previous)
        } else {
            None
        };
        self.state = ToolState::Panning { anchor, restore };
    }

    /// Move the pan anchor to `position`, returning the screen delta to apply.
    pub fn pan_to(&mut self, position: Point) -> Option<Vec2> {
        if let ToolState::Panning { anchor, .. } = &mut self.state {
            let delta = position - *anchor;
            *anchor = position;
            Some(delta)
        } else {
            None
        }
    }

    /// Stop panning and restore the tool a forced pan replaced.
    pub fn end_pan(&mut self) {
        if let ToolState::Panning { restore, .. } = self.state {
            if let Some(tool) = restore {
                self.current_tool = tool;
            }
            self.state = ToolState::Idle;
        }
    }

    pub fn begin_drag(&mut self, index: usize, pointer: Point, origin: Point) {
        self.state = ToolState::DraggingImage {
            index,
            last: pointer,
            origin,
        };
    }

    /// Advance the drag to `pointer` (document space). Returns the image index and delta.
    pub fn drag_to(&mut self, pointer: Point) -> Option<(usize, Vec2)> {
        if let ToolState::DraggingImage { index, last, .. } = &mut self.state {
            let delta = pointer - *last;
            *last = pointer;
            Some((*index, delta))
        } else {
            None
        }
    }

    pub fn end_drag(&mut self) -> Option<DragOutcome> {
        match self.state {
            ToolState::DraggingImage { index, origin, .. } => {
                self.state = ToolState::Idle;
                Some(DragOutcome { index, origin })
            }
            _ => None,
        }
    }

    /// Abandon the current interaction, restoring a forced-pan tool.
    pub fn cancel(&mut self) {
        if self.is_panning() {
            self.end_pan();
        }
        self.state = ToolState::Idle;
    }
}
