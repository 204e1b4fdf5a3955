//! Canvas document and the interactive drawing surface built on it.

use crate::config::{CanvasConfig, Preferences};
use crate::error::{SyncError, SyncResult};
use crate::history::History;
use crate::input::{InputState, PointerButton, PointerEvent};
use crate::shapes::{AssetId, CssColor, PlacedImage, Stroke};
use crate::sync::SyncDocument;
use crate::tools::{ToolKind, ToolManager, ToolState};
use crate::viewport::{Viewport, ZoomLimits};
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Background used when a payload does not carry one.
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

fn default_background() -> CssColor {
    CssColor::new(DEFAULT_BACKGROUND)
}

/// `null` reads as an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The persisted drawing: strokes, placed images and a background color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    /// Committed strokes in drawing order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lines: Vec<Stroke>,
    /// Placed images in stacking order (last on top).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<PlacedImage>,
    #[serde(rename = "backgroundColor", default = "default_background")]
    pub background_color: CssColor,
    /// Top-level fields written by other clients.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CanvasDocument {
    fn default() -> Self {
        Self::with_background(default_background())
    }
}

impl CanvasDocument {
    pub fn with_background(background_color: CssColor) -> Self {
        Self {
            lines: Vec::new(),
            images: Vec::new(),
            background_color,
            extra: Map::new(),
        }
    }

    /// Parse a stored payload. Blank content is an empty canvas.
    pub fn from_json(content: &str) -> SyncResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content).map_err(SyncError::from)
    }

    pub fn to_json(&self) -> SyncResult<String> {
        serde_json::to_string(self).map_err(SyncError::from)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.images.is_empty()
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            lines: self.lines.clone(),
            images: self.images.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: CanvasSnapshot) {
        self.lines = snapshot.lines;
        self.images = snapshot.images;
    }

    /// Union of stroke bounds and the bounds of images with a known size.
    pub fn content_bounds<F>(&self, natural_size: F) -> Option<Rect>
    where
        F: Fn(&AssetId) -> Option<Size>,
    {
        let strokes = self
            .lines
            .iter()
            .filter(|line| !line.is_empty())
            .map(Stroke::bounds);
        let images = self
            .images
            .iter()
            .filter_map(|image| natural_size(&image.asset_id).map(|size| image.bounds(size)));

        strokes.chain(images).reduce(|acc, rect| acc.union(rect))
    }
}

/// What undo and redo restore: everything but the background.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanvasSnapshot {
    pub lines: Vec<Stroke>,
    pub images: Vec<PlacedImage>,
}

/// An editable canvas: the document plus everything a live editing session needs
/// around it (viewport, tools, history, pointer tracking and selection).
#[derive(Debug, Clone)]
pub struct CanvasSurface {
    document: CanvasDocument,
    pub viewport: Viewport,
    zoom: ZoomLimits,
    pub tools: ToolManager,
    history: History<CanvasSnapshot>,
    input: InputState,
    selected_image: Option<usize>,
    image_sizes: HashMap<AssetId, Size>,
    preferences: Preferences,
    changed: bool,
}

impl Default for CanvasSurface {
    fn default() -> Self {
        Self::new(&CanvasConfig::default(), Preferences::default())
    }
}

impl CanvasSurface {
    pub fn new(config: &CanvasConfig, preferences: Preferences) -> Self {
        Self {
            document: CanvasDocument::with_background(preferences.default_background()),
            viewport: Viewport::IDENTITY,
            zoom: ZoomLimits {
                min_scale: config.min_scale,
                max_scale: config.max_scale,
                step: config.zoom_step,
            },
            tools: ToolManager::with_style(config.stroke_color.clone(), config.stroke_width),
            history: History::new(config.history_depth),
            input: InputState::new(),
            selected_image: None,
            image_sizes: HashMap::new(),
            preferences,
            changed: false,
        }
    }

    pub fn document(&self) -> &CanvasDocument {
        &self.document
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn history(&self) -> &History<CanvasSnapshot> {
        &self.history
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn selected_image(&self) -> Option<usize> {
        self.selected_image
    }

    pub fn set_tool(&mut self, tool: ToolKind) {
        self.tools.set_tool(tool);
    }

    pub fn set_stroke_color(&mut self, color: CssColor) {
        self.tools.stroke_color = color;
    }

    pub fn set_stroke_width(&mut self, width: f64) {
        self.tools.stroke_width = width.max(0.1);
    }

    pub fn set_background(&mut self, color: CssColor) {
        if self.document.background_color != color {
            self.document.background_color = color;
            self.changed = true;
        }
    }

    /// Remember the pixel size of an asset so its placements can be hit-tested.
    pub fn register_image_size(&mut self, asset_id: AssetId, size: Size) {
        self.image_sizes.insert(asset_id, size);
    }

    pub fn image_size(&self, asset_id: &AssetId) -> Option<Size> {
        self.image_sizes.get(asset_id).copied()
    }

    pub fn content_bounds(&self) -> Option<Rect> {
        self.document.content_bounds(|id| self.image_size(id))
    }

    /// Last pointer position in document space.
    pub fn pointer_document_position(&self) -> Option<Point> {
        self.input
            .pointer_position
            .map(|p| self.viewport.to_document_space(p))
    }

    /// Feed a pointer event through the tool state machine.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) {
        self.input.handle_pointer_event(&event);

        match event {
            PointerEvent::Down {
                position,
                button,
                modality,
            } => {
                if self.tools.is_active() {
                    return;
                }
                if button.is_alternate() {
                    self.tools.begin_pan(position, true);
                    return;
                }
                if self.tools.current_tool == ToolKind::Pan {
                    self.tools.begin_pan(position, false);
                    return;
                }

                let point = self.viewport.to_document_space(position);
                if let Some(index) = self.selected_image_at(point) {
                    if modality.allows_object_drag() {
                        let origin = self.document.images[index].position();
                        self.tools.begin_drag(index, point, origin);
                    } else {
                        self.tools.begin_pan(position, false);
                    }
                    return;
                }

                self.selected_image = None;
                self.tools.begin_stroke(point);
            }
            PointerEvent::Move { position, .. } => match self.tools.state {
                ToolState::Drawing { .. } => {
                    let point = self.viewport.to_document_space(position);
                    self.tools.extend_stroke(point);
                }
                ToolState::Panning { .. } => {
                    if let Some(delta) = self.tools.pan_to(position) {
                        self.viewport.pan(delta);
                    }
                }
                ToolState::DraggingImage { .. } => {
                    let point = self.viewport.to_document_space(position);
                    if let Some((index, delta)) = self.tools.drag_to(point) {
                        if let Some(image) = self.document.images.get_mut(index) {
                            image.set_position(image.position() + delta);
                        }
                    }
                }
                ToolState::Idle => {}
            },
            PointerEvent::Up { button, .. } => match self.tools.state {
                ToolState::Drawing { .. } if button == PointerButton::Primary => {
                    if let Some(stroke) = self.tools.finish_stroke() {
                        self.commit_stroke(stroke);
                    }
                }
                ToolState::Panning { restore, .. } => {
                    // A forced pan lasts while any alternate button is still down.
                    if restore.is_none()
                        || (button.is_alternate() && !self.input.alternate_held())
                    {
                        self.tools.end_pan();
                    }
                }
                ToolState::DraggingImage { .. } => {
                    if let Some(outcome) = self.tools.end_drag() {
                        self.finish_drag(outcome.index, outcome.origin);
                    }
                }
                _ => {}
            },
            PointerEvent::Wheel { position, delta } => {
                self.viewport.zoom_at_pointer(position, delta.y, &self.zoom);
            }
        }
    }

    /// Append a finished stroke and record the pre-append state.
    pub fn commit_stroke(&mut self, stroke: Stroke) {
        let before = self.document.snapshot();
        self.document.lines.push(stroke);
        self.commit(before);
    }

    fn finish_drag(&mut self, index: usize, origin: Point) {
        let Some(image) = self.document.images.get(index) else {
            return;
        };
        if image.position() == origin {
            return;
        }
        let mut before = self.document.snapshot();
        before.images[index].set_position(origin);
        self.commit(before);
    }

    fn commit(&mut self, before: CanvasSnapshot) {
        self.history.commit(before);
        self.changed = true;
    }

    /// Place an uploaded image at the last pointer position.
    ///
    /// Any stroke in progress is left alone; the placement commits on its own.
    pub fn place_image(&mut self, asset_id: AssetId, natural_size: Option<Size>) -> usize {
        let position = self
            .pointer_document_position()
            .unwrap_or_else(|| self.viewport.to_document_space(Point::ZERO));
        if let Some(size) = natural_size {
            self.register_image_size(asset_id.clone(), size);
        }

        let before = self.document.snapshot();
        self.document.images.push(PlacedImage::new(asset_id, position));
        self.commit(before);
        self.document.images.len() - 1
    }

    fn selected_image_at(&self, point: Point) -> Option<usize> {
        let index = self.selected_image?;
        let image = self.document.images.get(index)?;
        let size = self.image_size(&image.asset_id)?;
        image.hit_test(point, size).then_some(index)
    }

    /// Select the topmost image under a screen point, or clear the selection.
    pub fn select_at(&mut self, screen: Point) -> Option<usize> {
        let point = self.viewport.to_document_space(screen);
        self.selected_image = self
            .document
            .images
            .iter()
            .enumerate()
            .rev()
            .find(|(_, image)| {
                self.image_sizes
                    .get(&image.asset_id)
                    .is_some_and(|size| image.hit_test(point, *size))
            })
            .map(|(index, _)| index);
        self.selected_image
    }

    pub fn clear_selection(&mut self) {
        self.selected_image = None;
    }

    /// Set the scale of the selected image. Returns false when nothing is selected.
    pub fn scale_selected_image(&mut self, scale_x: f64, scale_y: f64) -> bool {
        let Some(index) = self.selected_image else {
            return false;
        };
        let Some(image) = self.document.images.get(index) else {
            return false;
        };
        if image.scale_x == scale_x && image.scale_y == scale_y {
            return true;
        }

        let before = self.document.snapshot();
        let image = &mut self.document.images[index];
        image.scale_x = scale_x;
        image.scale_y = scale_y;
        self.commit(before);
        true
    }

    /// Remove the selected image and return it so its asset can be released.
    pub fn delete_selected_image(&mut self) -> Option<PlacedImage> {
        let index = self.selected_image.take()?;
        if index >= self.document.images.len() {
            return None;
        }
        // An unfinished drag is abandoned and its image goes back to where it started.
        if let ToolState::DraggingImage {
            index: dragged,
            origin,
            ..
        } = self.tools.state
        {
            self.tools.cancel();
            if let Some(image) = self.document.images.get_mut(dragged) {
                image.set_position(origin);
            }
        }
        let before = self.document.snapshot();
        let removed = self.document.images.remove(index);
        self.commit(before);
        Some(removed)
    }

    pub fn undo(&mut self) -> bool {
        let current = self.document.snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.apply_history(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.document.snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.apply_history(next);
                true
            }
            None => false,
        }
    }

    fn apply_history(&mut self, snapshot: CanvasSnapshot) {
        self.document.restore(snapshot);
        self.selected_image = None;
        self.changed = true;
    }

    /// Remove everything and forget history.
    pub fn clear(&mut self) {
        self.tools.cancel();
        self.document.lines.clear();
        self.document.images.clear();
        self.history.clear();
        self.selected_image = None;
        self.changed = true;
    }
}

impl SyncDocument for CanvasSurface {
    fn serialize_content(&self) -> SyncResult<String> {
        self.document.to_json()
    }

    fn replace_content(&mut self, content: &str) -> SyncResult<()> {
        let mut document = CanvasDocument::from_json(content)?;
        if content.trim().is_empty() {
            document.background_color = self.preferences.default_background();
        }
        self.document = document;
        self.history.clear();
        self.selected_image = None;
        Ok(())
    }

    fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    fn is_interaction_active(&self) -> bool {
        matches!(
            self.tools.state,
            ToolState::Drawing { .. } | ToolState::DraggingImage { .. }
        )
    }
}
