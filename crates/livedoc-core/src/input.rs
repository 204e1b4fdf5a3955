//! Pointer input model shared by the drawing surfaces.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pointer button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

impl PointerButton {
    /// Buttons that force a transient pan regardless of the selected tool.
    pub fn is_alternate(self) -> bool {
        matches!(self, PointerButton::Middle | PointerButton::Secondary)
    }
}

/// The class of device that produced a pointer event.
///
/// Touch behaves differently from mouse and pen: object dragging is
/// suppressed so that single-finger gestures scroll the canvas instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputModality {
    #[default]
    Mouse,
    Pen,
    Touch,
}

impl InputModality {
    /// Whether this modality may drag placed objects.
    pub fn allows_object_drag(self) -> bool {
        !matches!(self, InputModality::Touch)
    }
}

/// Pointer event in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down {
        position: Point,
        button: PointerButton,
        modality: InputModality,
    },
    Move {
        position: Point,
        modality: InputModality,
    },
    Up {
        position: Point,
        button: PointerButton,
        modality: InputModality,
    },
    Wheel {
        position: Point,
        delta: Vec2,
    },
}

impl PointerEvent {
    /// Screen position carried by the event.
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { position, .. }
            | PointerEvent::Move { position, .. }
            | PointerEvent::Up { position, .. }
            | PointerEvent::Wheel { position, .. } => position,
        }
    }
}

/// Tracks pointer state across events.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Last known pointer position in screen coordinates.
    pub pointer_position: Option<Point>,
    /// Modality of the most recent event that carried one.
    pub modality: InputModality,
    /// Currently pressed buttons.
    pressed_buttons: HashSet<PointerButton>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pointer event.
    pub fn handle_pointer_event(&mut self, event: &PointerEvent) {
        self.pointer_position = Some(event.position());
        match *event {
            PointerEvent::Down {
                button, modality, ..
            } => {
                self.modality = modality;
                self.pressed_buttons.insert(button);
            }
            PointerEvent::Move { modality, .. } => {
                self.modality = modality;
            }
            PointerEvent::Up {
                button, modality, ..
            } => {
                self.modality = modality;
                self.pressed_buttons.remove(&button);
            }
            PointerEvent::Wheel { .. } => {}
        }
    }

    /// Whether any alternate (pan-forcing) button is held.
    pub fn alternate_held(&self) -> bool {
        self.pressed_buttons.iter().any(|b| b.is_alternate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_tracking() {
        let mut input = InputState::new();
        input.handle_pointer_event(&PointerEvent::Down {
            position: Point::new(10.0, 10.0),
            button: PointerButton::Middle,
            modality: InputModality::Mouse,
        });
        assert!(input.alternate_held());

        input.handle_pointer_event(&PointerEvent::Up {
            position: Point::new(12.0, 10.0),
            button: PointerButton::Middle,
            modality: InputModality::Mouse,
        });
        assert!(!input.alternate_held());
        assert_eq!(input.pointer_position, Some(Point::new(12.0, 10.0)));
    }

    #[test]
    fn test_modality_follows_events() {
        let mut input = InputState::new();
        input.handle_pointer_event(&PointerEvent::Move {
            position: Point::ZERO,
            modality: InputModality::Touch,
        });
        assert_eq!(input.modality, InputModality::Touch);
        assert!(!input.modality.allows_object_drag());

        // Wheel events keep the previous modality.
        input.handle_pointer_event(&PointerEvent::Wheel {
            position: Point::new(1.0, 1.0),
            delta: Vec2::new(0.0, 3.0),
        });
        assert_eq!(input.modality, InputModality::Touch);
    }
}
