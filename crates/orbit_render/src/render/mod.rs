//! Rendering
//!
//! The Vulkan backend plus the renderer-level types built on it: the orbit
//! camera, CPU-side mesh data and the frame driver.

/// Rendering backends
pub mod backends;

/// Orbit camera
pub mod camera;

/// CPU-side mesh data
pub mod mesh;

/// Frame driver
pub mod renderer;

pub use camera::OrbitCamera;
pub use mesh::{MeshData, Vertex};
pub use renderer::{FrameStatus, Renderer};
