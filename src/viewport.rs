use crate::camera::PerspectiveCamera;
use crate::render::FrameTarget;

/// Upper bound on the device pixel ratio used for the drawing buffer.
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// Clamps a device pixel ratio to `(0, MAX_PIXEL_RATIO]`. Invalid ratios fall
/// back to 1.
pub fn clamp_pixel_ratio(device_pixel_ratio: f64) -> f64 {
    if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio.min(MAX_PIXEL_RATIO)
    } else {
        1.0
    }
}

/// Logical viewport size plus the clamped pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, device_pixel_ratio: f64) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            pixel_ratio: clamp_pixel_ratio(device_pixel_ratio),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Physical size of the drawing buffer.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        drawing_buffer_size(self.width, self.height, self.pixel_ratio)
    }
}

pub fn drawing_buffer_size(width: u32, height: u32, pixel_ratio: f64) -> (u32, u32) {
    let scale = |logical: u32| ((logical as f64 * pixel_ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Ratio between a drawing buffer and the logical size it covers. Native
/// swapchains follow the window, so this can exceed [`MAX_PIXEL_RATIO`].
pub fn effective_pixel_ratio(buffer_width: u32, logical_width: u32) -> f64 {
    if logical_width == 0 {
        return 1.0;
    }
    f64::from(buffer_width) / f64::from(logical_width)
}

/// Applies a window resize: records the new size, refreshes the camera
/// projection and resizes the render target. Zero-sized windows (minimised)
/// are ignored. Returns whether anything changed.
pub fn handle_resize<T>(
    viewport: &mut Viewport,
    camera: &mut PerspectiveCamera,
    target: &mut T,
    width: u32,
    height: u32,
    device_pixel_ratio: f64,
) -> bool
where
    T: FrameTarget + ?Sized,
{
    if width == 0 || height == 0 {
        return false;
    }
    let next = Viewport::new(width, height, device_pixel_ratio);
    let changed = next != *viewport
        || target.size() != (next.width, next.height)
        || target.pixel_ratio() != next.pixel_ratio;
    *viewport = next;

    camera.aspect = viewport.aspect();
    camera.update_projection_matrix();
    target.set_size(viewport.width, viewport.height);
    target.set_pixel_ratio(viewport.pixel_ratio);
    changed
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;
    use crate::render::HeadlessTarget;

    #[test]
    fn pixel_ratio_is_clamped_to_two() {
        assert_eq!(clamp_pixel_ratio(1.0), 1.0);
        assert_eq!(clamp_pixel_ratio(1.5), 1.5);
        assert_eq!(clamp_pixel_ratio(3.0), 2.0);
        assert_eq!(clamp_pixel_ratio(0.0), 1.0);
        assert_eq!(clamp_pixel_ratio(f64::NAN), 1.0);
    }

    #[test]
    fn drawing_buffer_rounds_scaled_size() {
        let viewport = Viewport::new(1001, 501, 1.5);
        assert_eq!(viewport.drawing_buffer_size(), (1502, 752));
        assert_eq!(Viewport::new(800, 600, 3.0).drawing_buffer_size(), (1600, 1200));
    }

    #[test]
    fn effective_ratio_reports_the_buffer_scale() {
        let (width, _) = drawing_buffer_size(800, 600, clamp_pixel_ratio(3.0));
        assert_eq!(effective_pixel_ratio(width, 800), 2.0);
        assert_eq!(effective_pixel_ratio(2400, 800), 3.0);
        assert_eq!(effective_pixel_ratio(1200, 0), 1.0);
    }

    #[test]
    fn resize_updates_camera_and_target() {
        let mut viewport = Viewport::new(1280, 720, 1.0);
        let mut camera = PerspectiveCamera::new(75.0, viewport.aspect(), 0.1, 100.0);
        let mut target = HeadlessTarget::new(1280, 720);

        assert!(handle_resize(&mut viewport, &mut camera, &mut target, 1000, 500, 3.0));
        assert_eq!(camera.aspect, 2.0);
        assert_eq!(
            camera.projection_matrix(),
            Mat4::perspective_rh(75f32.to_radians(), 2.0, 0.1, 100.0)
        );
        assert_eq!(target.size(), (1000, 500));
        assert_eq!(target.pixel_ratio(), 2.0);
        assert_eq!(target.drawing_buffer_size(), (2000, 1000));
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut viewport = Viewport::new(1280, 720, 1.0);
        let mut camera = PerspectiveCamera::new(75.0, viewport.aspect(), 0.1, 100.0);
        let before = camera.projection_matrix();
        let mut target = HeadlessTarget::new(1280, 720);
        assert!(!handle_resize(&mut viewport, &mut camera, &mut target, 0, 720, 1.0));
        assert_eq!(viewport.width, 1280);
        assert_eq!(camera.projection_matrix(), before);
    }
}
