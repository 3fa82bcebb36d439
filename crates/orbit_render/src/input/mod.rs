//! Pointer input tracking for the orbit camera
//!
//! The window event stream is fed into [`InputState`] explicitly by the
//! application; nothing here registers callbacks with the windowing layer.

use crate::foundation::math::Vec2;

/// Mouse buttons the renderer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button, drives orbiting
    Left,
    /// Secondary button
    Right,
    /// Wheel button
    Middle,
}

/// Accumulated pointer-drag state
#[derive(Debug, Default, Clone)]
pub struct InputState {
    left_pressed: bool,
    last_cursor: Option<Vec2>,
    drag_delta: Vec2,
}

impl InputState {
    /// Create an idle input state
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a button press or release
    ///
    /// Pressing the left button starts a drag from the current cursor position;
    /// releasing it drops any delta not yet consumed.
    pub fn handle_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if button != MouseButton::Left {
            return;
        }
        self.left_pressed = pressed;
        if !pressed {
            self.drag_delta = Vec2::zeros();
        }
    }

    /// Handle cursor movement in window coordinates
    pub fn handle_mouse_move(&mut self, x: f64, y: f64) {
        let position = Vec2::new(x as f32, y as f32);
        if self.left_pressed {
            if let Some(last) = self.last_cursor {
                self.drag_delta += position - last;
            }
        }
        self.last_cursor = Some(position);
    }

    /// Feed a raw glfw window event
    pub fn handle_window_event(&mut self, event: &glfw::WindowEvent) {
        match *event {
            glfw::WindowEvent::MouseButton(button, action, _) => {
                let button = match button {
                    glfw::MouseButton::Button1 => MouseButton::Left,
                    glfw::MouseButton::Button2 => MouseButton::Right,
                    glfw::MouseButton::Button3 => MouseButton::Middle,
                    _ => return,
                };
                self.handle_mouse_button(button, action != glfw::Action::Release);
            }
            glfw::WindowEvent::CursorPos(x, y) => self.handle_mouse_move(x, y),
            _ => {}
        }
    }

    /// Whether the orbit button is held
    pub const fn is_dragging(&self) -> bool {
        self.left_pressed
    }

    /// Return the drag delta accumulated since the last call and reset it
    pub fn take_drag_delta(&mut self) -> Vec2 {
        std::mem::replace(&mut self.drag_delta, Vec2::zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_motion_without_button_is_ignored() {
        let mut input = InputState::new();
        input.handle_mouse_move(10.0, 10.0);
        input.handle_mouse_move(20.0, 30.0);
        assert_eq!(input.take_drag_delta(), Vec2::zeros());
    }

    #[test]
    fn test_drag_accumulates_until_taken() {
        let mut input = InputState::new();
        input.handle_mouse_move(100.0, 100.0);
        input.handle_mouse_button(MouseButton::Left, true);
        input.handle_mouse_move(105.0, 98.0);
        input.handle_mouse_move(110.0, 97.0);

        let delta = input.take_drag_delta();
        assert_relative_eq!(delta.x, 10.0);
        assert_relative_eq!(delta.y, -3.0);
        assert_eq!(input.take_drag_delta(), Vec2::zeros());
    }

    #[test]
    fn test_release_clears_pending_delta() {
        let mut input = InputState::new();
        input.handle_mouse_move(0.0, 0.0);
        input.handle_mouse_button(MouseButton::Left, true);
        input.handle_mouse_move(4.0, 4.0);
        input.handle_mouse_button(MouseButton::Left, false);

        assert!(!input.is_dragging());
        assert_eq!(input.take_drag_delta(), Vec2::zeros());
    }

    #[test]
    fn test_right_button_does_not_drag() {
        let mut input = InputState::new();
        input.handle_mouse_move(0.0, 0.0);
        input.handle_mouse_button(MouseButton::Right, true);
        input.handle_mouse_move(5.0, 5.0);
        assert_eq!(input.take_drag_delta(), Vec2::zeros());
    }

    #[test]
    fn test_glfw_events_are_translated() {
        let mut input = InputState::new();
        input.handle_window_event(&glfw::WindowEvent::CursorPos(1.0, 1.0));
        input.handle_window_event(&glfw::WindowEvent::MouseButton(
            glfw::MouseButton::Button1,
            glfw::Action::Press,
            glfw::Modifiers::empty(),
        ));
        input.handle_window_event(&glfw::WindowEvent::CursorPos(3.0, 2.0));

        let delta = input.take_drag_delta();
        assert_relative_eq!(delta.x, 2.0);
        assert_relative_eq!(delta.y, 1.0);
    }
}
