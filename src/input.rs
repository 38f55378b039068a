use glam::Vec2;
use serde::{Deserialize, Serialize};
use winit::event::{MouseButton as WinitMouseButton, MouseScrollDelta};

use crate::camera::{OrbitControls, PerspectiveCamera};

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

pub fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    let index = match button {
        WinitMouseButton::Left => 0,
        WinitMouseButton::Right => 1,
        WinitMouseButton::Middle => 2,
        WinitMouseButton::Back => 3,
        WinitMouseButton::Forward => 4,
        WinitMouseButton::Other(value) => value.min(u16::from(u8::MAX)),
    } as u8;
    MouseButton::new(index)
}

/// What a drag with a given button does to the orbit controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Rotate,
    Dolly,
    Pan,
}

impl DragMode {
    pub fn for_button(button: MouseButton) -> Option<Self> {
        match button {
            MouseButton::LEFT => Some(Self::Rotate),
            MouseButton::MIDDLE => Some(Self::Dolly),
            MouseButton::RIGHT => Some(Self::Pan),
            _ => None,
        }
    }
}

/// Cursor movement since the previous event while a button is held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerDrag {
    pub mode: DragMode,
    pub delta: Vec2,
}

/// Tracks the cursor and the button that started the current drag.
///
/// Only one drag is active at a time; other buttons pressed meanwhile are
/// ignored until it ends.
#[derive(Debug, Clone, Default)]
pub struct PointerState {
    position: Option<Vec2>,
    active: Option<(MouseButton, DragMode)>,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a drag. Returns false when the button has no drag mode or a
    /// drag is already running.
    pub fn press(&mut self, button: MouseButton) -> bool {
        if self.active.is_some() {
            return false;
        }
        match DragMode::for_button(button) {
            Some(mode) => {
                self.active = Some((button, mode));
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, button: MouseButton) {
        if matches!(self.active, Some((active, _)) if active == button) {
            self.active = None;
        }
    }

    /// Records the new cursor position and returns the drag step, if any.
    pub fn move_to(&mut self, position: Vec2) -> Option<PointerDrag> {
        let previous = self.position.replace(position);
        let (_, mode) = self.active?;
        let delta = position - previous?;
        if delta == Vec2::ZERO {
            return None;
        }
        Some(PointerDrag { mode, delta })
    }

    /// Forgets the cursor, e.g. when it leaves the window.
    pub fn leave(&mut self) {
        self.position = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn position(&self) -> Option<Vec2> {
        self.position
    }
}

/// Routes a drag step to the orbit controls.
pub fn apply_drag(
    controls: &mut OrbitControls,
    camera: &PerspectiveCamera,
    drag: PointerDrag,
    viewport_height: f32,
) {
    let PointerDrag { mode, delta } = drag;
    match mode {
        DragMode::Rotate => controls.handle_rotate_drag(delta.x, delta.y, viewport_height),
        DragMode::Pan => controls.handle_pan_drag(delta.x, delta.y, viewport_height, camera),
        // Dragging down moves away from the target.
        DragMode::Dolly => controls.handle_wheel(delta.y.signum()),
    }
}

/// Converts a wheel event into notches for [`OrbitControls::handle_wheel`];
/// scrolling towards the user is positive.
pub fn wheel_notches(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => -y,
        MouseScrollDelta::PixelDelta(position) => -(position.y as f32) / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use winit::dpi::PhysicalPosition;

    use super::*;

    fn camera() -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0);
        camera.position = Vec3::new(0.0, 0.0, 10.0);
        camera.look_at(Vec3::ZERO);
        camera
    }

    #[test]
    fn winit_buttons_map_to_indices() {
        assert_eq!(map_mouse_button(WinitMouseButton::Left), MouseButton::LEFT);
        assert_eq!(map_mouse_button(WinitMouseButton::Right), MouseButton::RIGHT);
        assert_eq!(map_mouse_button(WinitMouseButton::Middle), MouseButton::MIDDLE);
        assert_eq!(map_mouse_button(WinitMouseButton::Other(900)).index(), 255);
    }

    #[test]
    fn drag_reports_deltas_only_while_pressed() {
        let mut pointer = PointerState::new();
        assert_eq!(pointer.move_to(Vec2::new(10.0, 10.0)), None);
        assert!(pointer.press(MouseButton::LEFT));
        let drag = pointer.move_to(Vec2::new(15.0, 7.0)).unwrap();
        assert_eq!(drag.mode, DragMode::Rotate);
        assert_eq!(drag.delta, Vec2::new(5.0, -3.0));

        pointer.release(MouseButton::LEFT);
        assert!(!pointer.is_dragging());
        assert_eq!(pointer.move_to(Vec2::new(20.0, 20.0)), None);
    }

    #[test]
    fn second_button_does_not_steal_the_drag() {
        let mut pointer = PointerState::new();
        pointer.move_to(Vec2::ZERO);
        assert!(pointer.press(MouseButton::RIGHT));
        assert!(!pointer.press(MouseButton::LEFT));
        pointer.release(MouseButton::LEFT);
        let drag = pointer.move_to(Vec2::new(1.0, 0.0)).unwrap();
        assert_eq!(drag.mode, DragMode::Pan);
        assert!(!pointer.press(MouseButton::new(7)));
    }

    #[test]
    fn rotate_drag_moves_the_camera_around_the_target() {
        let mut camera = camera();
        let mut controls = OrbitControls::new(Vec3::ZERO);
        let drag = PointerDrag {
            mode: DragMode::Rotate,
            delta: Vec2::new(100.0, 0.0),
        };
        apply_drag(&mut controls, &camera, drag, 720.0);
        assert!(controls.update(&mut camera));
        assert!(camera.position.x < 0.0);
        assert!((camera.position.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn wheel_down_zooms_out() {
        assert_eq!(wheel_notches(MouseScrollDelta::LineDelta(0.0, -1.0)), 1.0);
        assert_eq!(
            wheel_notches(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 50.0))),
            -0.5
        );

        let mut camera = camera();
        let mut controls = OrbitControls::new(Vec3::ZERO);
        controls.enable_damping = false;
        controls.handle_wheel(wheel_notches(MouseScrollDelta::LineDelta(0.0, -1.0)));
        controls.update(&mut camera);
        assert!(camera.position.length() > 10.0);
    }
}
