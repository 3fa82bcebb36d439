//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the projection helpers the renderer needs.

pub use nalgebra::{Matrix4, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Right-handed perspective projection targeting Vulkan clip space
///
/// Vulkan clip space has Y pointing down and depth in `[0, 1]`, so the
/// OpenGL-style matrix from nalgebra is corrected on the left.
pub fn perspective_vk(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    #[rustfmt::skip]
    let clip = Mat4::new(
        1.0,  0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0,  0.0, 0.5, 0.5,
        0.0,  0.0, 0.0, 1.0,
    );
    clip * Mat4::new_perspective(aspect, fov_y_radians, near, far)
}

/// Right-handed view matrix looking from `eye` towards `target`
pub fn look_at(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(*eye), &Point3::from(*target), up)
}

/// Column-major array layout as expected by GLSL `mat4`
pub fn to_cols_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    let mut out = [[0.0; 4]; 4];
    for (col, slot) in out.iter_mut().enumerate() {
        for (row, value) in slot.iter_mut().enumerate() {
            *value = matrix[(row, col)];
        }
    }
    out
}
