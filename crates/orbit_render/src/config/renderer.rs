//! # Renderer Configuration
//!
//! Window, shader, camera and debug settings consumed by
//! [`Renderer::on_create`](crate::render::renderer::Renderer::on_create).

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{Config, ConfigError};

/// Window creation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Orbit Viewer".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// # Shader Configuration
///
/// Paths to the compiled SPIR-V modules for the mesh pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the usual build output locations so the viewer can be run from
    /// the workspace root or from its own directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 4] = ["target/shaders/", "../target/shaders/", "shaders/", "./"];

        let resolve = |file: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{file}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if !Path::new(&self.fragment_shader_path).exists() {
            return Err(format!("Fragment shader not found: {}", self.fragment_shader_path));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("mesh.vert.spv", "mesh.frag.spv")
    }
}

/// Orbit camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane distance
    pub near: f32,
    /// Far clip plane distance
    pub far: f32,
    /// Starting distance from the orbit target
    pub distance: f32,
    /// World units moved per pixel of pointer drag
    pub orbit_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            distance: 3.0,
            orbit_sensitivity: 0.01,
        }
    }
}

/// # Renderer Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable the Khronos validation layer and debug messenger
    pub enable_validation: bool,
    /// Clear color for the swapchain render pass (RGBA)
    pub clear_color: [f32; 4],
    /// Window settings
    pub window: WindowConfig,
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Camera configuration
    pub camera: CameraConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            window: WindowConfig::default(),
            shaders: ShaderConfig::default(),
            camera: CameraConfig::default(),
        }
    }

    /// Set application version
    #[must_use]
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set the initial window size
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set the render pass clear color
    #[must_use]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Validate the configuration
    ///
    /// Shader paths are not checked here; a missing module is reported when the
    /// pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        let camera = &self.camera;
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!("Field of view out of range: {}", camera.fov_degrees)));
        }
        if camera.near <= 0.0 || camera.far <= camera.near {
            return Err(ConfigError::Invalid(format!(
                "Clip planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            )));
        }
        if camera.distance <= 0.0 {
            return Err(ConfigError::Invalid("Camera distance must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Orbit Viewer")
    }
}

impl Config for RendererConfig {}
