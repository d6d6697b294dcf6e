use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels per wheel line when the platform reports line deltas.
const LINE_HEIGHT: f32 = 40.0;
/// Dolly distance per wheel pixel.
const ZOOM_PER_PIXEL: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    DeleteSelected,
    ToggleGizmoMode,
    Next,
    Previous,
}

/// Viewport input after egui had its pick, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionInput {
    PointerDown { x: f32, y: f32 },
    /// `dragging` is true while the left button is held.
    PointerMove {
        x: f32,
        y: f32,
        dx: f32,
        dy: f32,
        dragging: bool,
    },
    PointerUp,
    Zoom(f32),
    Key(KeyCommand),
}

#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    cursor: Option<(f32, f32)>,
    left_down: bool,
}

impl InputState {
    pub fn handle_key(&mut self, key: PhysicalKey, pressed: bool) -> Option<SessionInput> {
        if !pressed {
            return None;
        }
        let command = match key {
            PhysicalKey::Code(KeyCode::Delete) | PhysicalKey::Code(KeyCode::Backspace) => {
                KeyCommand::DeleteSelected
            }
            PhysicalKey::Code(KeyCode::KeyG) | PhysicalKey::Code(KeyCode::Tab) => {
                KeyCommand::ToggleGizmoMode
            }
            PhysicalKey::Code(KeyCode::ArrowDown) => KeyCommand::Next,
            PhysicalKey::Code(KeyCode::ArrowUp) => KeyCommand::Previous,
            _ => return None,
        };
        Some(SessionInput::Key(command))
    }

    pub fn cursor_moved(&mut self, x: f32, y: f32) -> Option<SessionInput> {
        let previous = self.cursor.replace((x, y));
        let (px, py) = previous?;
        Some(SessionInput::PointerMove {
            x,
            y,
            dx: x - px,
            dy: y - py,
            dragging: self.left_down,
        })
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn mouse_button(
        &mut self,
        button: MouseButton,
        state: ElementState,
    ) -> Option<SessionInput> {
        if button != MouseButton::Left {
            return None;
        }
        match state {
            ElementState::Pressed => {
                self.left_down = true;
                let (x, y) = self.cursor?;
                Some(SessionInput::PointerDown { x, y })
            }
            ElementState::Released => {
                let was_down = std::mem::replace(&mut self.left_down, false);
                was_down.then_some(SessionInput::PointerUp)
            }
        }
    }

    /// Wheel up zooms in (positive dolly).
    pub fn wheel(&mut self, delta: MouseScrollDelta) -> SessionInput {
        let pixels = match delta {
            MouseScrollDelta::LineDelta(_, y) => y * LINE_HEIGHT,
            MouseScrollDelta::PixelDelta(position) => position.y as f32,
        };
        SessionInput::Zoom(pixels * ZOOM_PER_PIXEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_needs_a_known_cursor() {
        let mut input = InputState::default();
        assert_eq!(input.mouse_button(MouseButton::Left, ElementState::Pressed), None);
        assert_eq!(input.cursor_moved(10.0, 20.0), None);
        assert_eq!(
            input.mouse_button(MouseButton::Left, ElementState::Pressed),
            Some(SessionInput::PointerDown { x: 10.0, y: 20.0 })
        );
    }

    #[test]
    fn drag_reports_deltas_until_release() {
        let mut input = InputState::default();
        input.cursor_moved(10.0, 10.0);
        input.mouse_button(MouseButton::Left, ElementState::Pressed);
        assert_eq!(
            input.cursor_moved(14.0, 7.0),
            Some(SessionInput::PointerMove {
                x: 14.0,
                y: 7.0,
                dx: 4.0,
                dy: -3.0,
                dragging: true,
            })
        );
        assert_eq!(
            input.mouse_button(MouseButton::Left, ElementState::Released),
            Some(SessionInput::PointerUp)
        );
        assert!(matches!(
            input.cursor_moved(15.0, 7.0),
            Some(SessionInput::PointerMove { dragging: false, .. })
        ));
        assert_eq!(input.mouse_button(MouseButton::Right, ElementState::Pressed), None);
    }

    #[test]
    fn editor_shortcuts() {
        let mut input = InputState::default();
        assert_eq!(
            input.handle_key(PhysicalKey::Code(KeyCode::Delete), true),
            Some(SessionInput::Key(KeyCommand::DeleteSelected))
        );
        assert_eq!(
            input.handle_key(PhysicalKey::Code(KeyCode::KeyG), true),
            Some(SessionInput::Key(KeyCommand::ToggleGizmoMode))
        );
        assert_eq!(input.handle_key(PhysicalKey::Code(KeyCode::KeyG), false), None);
        assert_eq!(input.handle_key(PhysicalKey::Code(KeyCode::KeyQ), true), None);
    }

    #[test]
    fn wheel_up_zooms_in() {
        let mut input = InputState::default();
        let SessionInput::Zoom(amount) = input.wheel(MouseScrollDelta::LineDelta(0.0, 1.0)) else {
            panic!("expected zoom");
        };
        assert!(amount > 0.0);
    }
}
