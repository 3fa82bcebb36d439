//! # Orbit camera
//!
//! A perspective camera circling a fixed target at a fixed distance. Pointer
//! drags move the eye along the camera's right and up axes, then the eye is
//! pulled back onto the sphere around the target.

use crate::config::CameraConfig;
use crate::foundation::math::{look_at, perspective_vk, Mat4, Vec2, Vec3};

/// Camera orbiting a target point
///
/// Keeps its own orthonormal basis (`forward`, `right`, `up`) and carries the
/// up vector from frame to frame, so orbiting over the poles does not flip.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    right: Vec3,
    forward: Vec3,
    distance: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    sensitivity: f32,
}

impl OrbitCamera {
    /// Create a camera on the +Z side of `target`
    ///
    /// # Arguments
    /// * `target` - Point the camera orbits and looks at
    /// * `distance` - Radius of the orbit (must be > 0)
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Viewport width divided by height
    /// * `near` / `far` - Clipping plane distances
    /// * `sensitivity` - World units moved per pixel of drag
    pub fn new(
        target: Vec3,
        distance: f32,
        fov_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
        sensitivity: f32,
    ) -> Self {
        let mut camera = Self {
            position: target + Vec3::new(0.0, 0.0, distance),
            target,
            up: Vec3::y(),
            right: Vec3::x(),
            forward: -Vec3::z(),
            distance,
            fov_y: fov_degrees.to_radians(),
            aspect,
            near,
            far,
            sensitivity,
        };
        camera.update_basis();
        camera
    }

    /// Camera looking at the origin with the configured parameters
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self::new(
            Vec3::zeros(),
            config.distance,
            config.fov_degrees,
            aspect,
            config.near,
            config.far,
            config.orbit_sensitivity,
        )
    }

    /// Orbit by a pointer drag delta in pixels
    pub fn orbit(&mut self, drag: Vec2) {
        if drag == Vec2::zeros() {
            return;
        }

        self.position += self.sensitivity * (drag.x * self.right + drag.y * self.up);

        let offset = self.position - self.target;
        let Some(direction) = offset.try_normalize(f32::EPSILON) else {
            return;
        };
        self.position = self.target + direction * self.distance;
        self.update_basis();
    }

    fn update_basis(&mut self) {
        self.forward = (self.target - self.position).normalize();
        // Keep the previous basis if the carried up vector became parallel
        if let Some(right) = self.forward.cross(&self.up).try_normalize(f32::EPSILON) {
            self.right = right;
        }
        self.up = self.right.cross(&self.forward).normalize();
    }

    /// Update the aspect ratio from a framebuffer size; zero sizes are ignored
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// World to camera transform
    pub fn view_matrix(&self) -> Mat4 {
        look_at(&self.position, &self.target, &self.up)
    }

    /// Camera to Vulkan clip space transform
    pub fn projection_matrix(&self) -> Mat4 {
        perspective_vk(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Eye position
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Orbit center
    pub const fn target(&self) -> Vec3 {
        self.target
    }

    /// Orbit radius
    pub const fn distance(&self) -> f32 {
        self.distance
    }

    /// Current aspect ratio
    pub const fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Camera up axis
    pub const fn up(&self) -> Vec3 {
        self.up
    }

    /// Camera right axis
    pub const fn right(&self) -> Vec3 {
        self.right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn camera() -> OrbitCamera {
        OrbitCamera::new(Vec3::zeros(), 3.0, 45.0, 4.0 / 3.0, 0.1, 100.0, 0.01)
    }

    #[test]
    fn test_initial_pose() {
        let camera = camera();
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(camera.right(), Vec3::x(), epsilon = 1e-6);
        assert_relative_eq!(camera.up(), Vec3::y(), epsilon = 1e-6);
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = camera();
        for _ in 0..50 {
            camera.orbit(Vec2::new(37.0, -12.0));
            assert_relative_eq!((camera.position() - camera.target()).norm(), 3.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_drag_right_moves_eye_right() {
        let mut camera = camera();
        camera.orbit(Vec2::new(10.0, 0.0));

        assert!(camera.position().x > 0.0);
        assert_relative_eq!(camera.position().y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_drag_is_noop() {
        let mut camera = camera();
        let before = camera.position();
        camera.orbit(Vec2::zeros());
        assert_eq!(camera.position(), before);
    }

    #[test]
    fn test_basis_stays_orthonormal() {
        let mut camera = camera();
        camera.orbit(Vec2::new(0.0, 200.0));
        camera.orbit(Vec2::new(150.0, 90.0));

        let forward = (camera.target() - camera.position()).normalize();
        assert_relative_eq!(camera.right().norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(camera.up().norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(camera.right().dot(&camera.up()), 0.0, epsilon = 1e-5);
        assert_relative_eq!(forward.dot(&camera.up()), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_view_puts_target_in_front() {
        let mut camera = camera();
        camera.orbit(Vec2::new(40.0, 25.0));

        let target = camera.view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.z, -3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_viewport_updates_aspect() {
        let mut camera = camera();
        camera.set_viewport(1920, 1080);
        assert_relative_eq!(camera.aspect(), 16.0 / 9.0);

        camera.set_viewport(0, 0);
        assert_relative_eq!(camera.aspect(), 16.0 / 9.0);
    }

    #[test]
    fn test_from_config() {
        let config = CameraConfig::default();
        let camera = OrbitCamera::from_config(&config, 1.0);
        assert_relative_eq!(camera.distance(), config.distance);
        assert_relative_eq!(camera.position().z, config.distance);
    }
}
