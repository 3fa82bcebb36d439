//! # Orbit Render
//!
//! Vulkan GPU resource and frame lifecycle core.
//!
//! ## Features
//!
//! - **Pooled Allocation**: every buffer and image goes through one `vk-mem` backed pool
//!   that tracks liveness and force-frees leftovers on teardown
//! - **Staging Uploads**: blocking one-shot uploads into GPU-only memory plus a closed
//!   table of image layout transitions
//! - **Swapchain State Machine**: create, recreate on resize and ordered teardown
//! - **Frame Loop**: acquire, uniform update, record, submit and present with a single
//!   reusable command buffer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orbit_render::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = Renderer::on_create(&mut window, &config)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if renderer.on_draw()? == FrameStatus::SwapchainOutOfDate {
//!             renderer.on_resize(&mut window)?;
//!         }
//!     }
//!     renderer.on_destroy();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod input;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RendererConfig},
        foundation::{
            math::{Mat4, Vec2, Vec3},
            time::FrameTimer,
        },
        input::InputState,
        render::{
            backends::vulkan::{
                initialization::window::{FramebufferSource, Window, WindowError},
                VulkanError, VulkanResult,
            },
            camera::OrbitCamera,
            mesh::{MeshData, Vertex},
            renderer::{FrameStatus, Renderer},
        },
    };
}
