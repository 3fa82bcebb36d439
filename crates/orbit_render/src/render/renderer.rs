//! # Renderer
//!
//! Frame driver tying the backend together. Owns the device context, the
//! resource pool, the staging engine, the swapchain and the per-swapchain
//! frame resources, and exposes the lifecycle the application calls:
//! [`Renderer::on_create`], [`Renderer::on_draw`], [`Renderer::on_resize`]
//! and [`Renderer::on_destroy`].
//!
//! Frames are strictly sequential. Each frame waits for its own fence before
//! presenting, so a single command buffer is reused every frame.

use std::time::Duration;

use crate::config::{RendererConfig, ShaderConfig};
use crate::foundation::math::Mat4;
use crate::foundation::time::FrameTimer;
use crate::input::InputState;
use crate::render::backends::vulkan::resources::allocator::GpuAllocator;
use crate::render::backends::vulkan::resources::model::Model;
use crate::render::backends::vulkan::resources::staging::StagingEngine;
use crate::render::backends::vulkan::resources::texture::Texture;
use crate::render::backends::vulkan::resources::uniform_buffer::UniformBufferObject;
use crate::render::backends::vulkan::state::frame_resources::FrameResources;
use crate::render::backends::vulkan::state::swapchain::{
    rebuild_when_visible, wait_for_nonzero_framebuffer, Swapchain, SwapchainState,
};
use crate::render::backends::vulkan::{FramebufferSource, VulkanContext, VulkanError, VulkanResult, Window};
use crate::render::camera::OrbitCamera;
use crate::render::mesh::MeshData;

/// Outcome of [`Renderer::on_draw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame reached the presentation engine
    Presented {
        /// Swapchain image the frame was rendered into
        image_index: u32,
    },
    /// The swapchain no longer matches the surface; call [`Renderer::on_resize`]
    SwapchainOutOfDate,
}

/// Vulkan renderer
///
/// Field order is drop order: everything holding pool records or swapchain
/// views goes first, the pool goes after the swapchain and the context is
/// dropped last.
pub struct Renderer {
    frame_resources: Option<FrameResources>,
    models: Vec<Model>,
    texture: Option<Texture>,
    staging: StagingEngine,
    swapchain: Swapchain,
    allocator: GpuAllocator,
    context: VulkanContext,

    camera: OrbitCamera,
    input: InputState,
    timer: FrameTimer,
    shaders: ShaderConfig,
    clear_color: [f32; 4],
    world_transform: Mat4,
    shut_down: bool,
}

impl Renderer {
    /// Bring up the device, pool, staging engine, swapchain and frame resources
    ///
    /// Blocks while the window is minimized, since a swapchain cannot be
    /// created for a zero-sized surface.
    pub fn on_create(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        log::info!("Creating renderer for '{}'", config.application_name);
        let context = VulkanContext::new(
            window,
            &config.application_name,
            config.application_version,
            config.enable_validation,
        )?;
        let mut allocator = GpuAllocator::from_context(&context)?;
        let mut staging = StagingEngine::new(&context)?;

        let (width, height) = wait_for_nonzero_framebuffer(window);
        let mut swapchain = Swapchain::new(&context);
        swapchain.create(window, width, height)?;

        let texture = Texture::white(&context, &mut allocator, &mut staging)?;
        let frame_resources = FrameResources::new(&context, &swapchain, &mut allocator, &config.shaders, &texture)?;

        let extent = swapchain.extent();
        let mut camera = OrbitCamera::from_config(&config.camera, 1.0);
        camera.set_viewport(extent.width, extent.height);

        log::info!(
            "Renderer ready: {}x{} with {} swapchain images",
            extent.width,
            extent.height,
            swapchain.image_count()
        );

        Ok(Self {
            frame_resources: Some(frame_resources),
            models: Vec::new(),
            texture: Some(texture),
            staging,
            swapchain,
            allocator,
            context,
            camera,
            input: InputState::new(),
            timer: FrameTimer::new(),
            shaders: config.shaders.clone(),
            clear_color: config.clear_color,
            world_transform: Mat4::identity(),
            shut_down: false,
        })
    }

    /// Render and present one frame
    ///
    /// Returns [`FrameStatus::SwapchainOutOfDate`] when acquire or present
    /// reports the swapchain as out of date or suboptimal. Any other failure is
    /// fatal.
    pub fn on_draw(&mut self) -> VulkanResult<FrameStatus> {
        self.timer.begin_frame();

        let Some(frame) = self.frame_resources.as_ref() else {
            if self.swapchain.state() == SwapchainState::Recreating {
                return Ok(FrameStatus::SwapchainOutOfDate);
            }
            return Err(VulkanError::invalid("No frame resources; the last resize did not complete"));
        };

        let image_index = match self.swapchain.acquire_next_image() {
            Ok(index) => index,
            Err(e) if e.is_transient() => return Ok(FrameStatus::SwapchainOutOfDate),
            Err(e) => return Err(e),
        };
        let slot = image_index as usize;

        self.camera.orbit(self.input.take_drag_delta());
        let ubo = UniformBufferObject::new(
            &self.world_transform,
            &self.camera.view_matrix(),
            &self.camera.projection_matrix(),
        );
        frame.update_uniforms(&mut self.allocator, slot, &ubo)?;

        frame.record(slot, self.swapchain.extent(), self.clear_color, &self.models)?;
        frame.submit(
            self.context.graphics_queue(),
            self.swapchain.image_available_semaphore(),
            self.swapchain.render_finished_semaphore(),
        )?;
        frame.wait_for_completion()?;

        let status = match self.swapchain.present(self.context.present_queue(), image_index) {
            Ok(()) => FrameStatus::Presented { image_index },
            Err(e) if e.is_transient() => FrameStatus::SwapchainOutOfDate,
            Err(e) => return Err(e),
        };

        self.timer.end_frame();
        Ok(status)
    }

    /// Rebuild the swapchain and everything that depends on it
    ///
    /// Polls `window` until its framebuffer is non-zero, so this blocks while
    /// the window is minimized. A surface that shrinks to zero again before
    /// the swapchain is rebuilt sends it back to polling.
    pub fn on_resize<S: FramebufferSource>(&mut self, window: &mut S) -> VulkanResult<()> {
        self.context.wait_idle()?;
        if let Some(frame) = self.frame_resources.take() {
            frame.destroy(&mut self.allocator);
        }

        let swapchain = &mut self.swapchain;
        rebuild_when_visible(window, |width, height| {
            log::info!("Recreating swapchain at {}x{}", width, height);
            swapchain.recreate(width, height)
        })?;
        self.rebuild_frame_resources()?;

        let extent = self.swapchain.extent();
        self.camera.set_viewport(extent.width, extent.height);
        Ok(())
    }

    /// Wait for the device and release every GPU object in reverse creation order
    pub fn on_destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(e) = self.context.wait_idle() {
            log::error!("Device did not go idle before shutdown: {}", e);
        }

        if let Some(frame) = self.frame_resources.take() {
            frame.destroy(&mut self.allocator);
        }
        for model in self.models.drain(..) {
            model.destroy(&mut self.allocator);
        }
        if let Some(texture) = self.texture.take() {
            texture.destroy(&mut self.allocator);
        }
        self.swapchain.destroy();

        let leftover = self.allocator.live_allocation_count();
        if leftover > 0 {
            log::warn!("{} allocations still live at shutdown; the pool releases them", leftover);
        }
        log::info!("Renderer shut down");
    }

    fn rebuild_frame_resources(&mut self) -> VulkanResult<()> {
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| VulkanError::invalid("No texture bound"))?;
        let frame = FrameResources::new(&self.context, &self.swapchain, &mut self.allocator, &self.shaders, texture)?;
        self.frame_resources = Some(frame);
        Ok(())
    }

    /// Upload meshes as a new model and return its index
    pub fn load_model(&mut self, meshes: &[MeshData]) -> VulkanResult<usize> {
        let model = Model::upload(&mut self.allocator, &mut self.staging, meshes)?;
        self.models.push(model);
        Ok(self.models.len() - 1)
    }

    /// Mutable access to a loaded model, e.g. to change its transform
    pub fn model_mut(&mut self, index: usize) -> Option<&mut Model> {
        self.models.get_mut(index)
    }

    /// Number of loaded models
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Replace the bound texture with tightly packed RGBA8 pixels
    ///
    /// Descriptor sets reference the texture, so the frame resources are
    /// rebuilt.
    pub fn set_texture_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]) -> VulkanResult<()> {
        let texture = Texture::from_rgba8(&self.context, &mut self.allocator, &mut self.staging, width, height, pixels)?;

        self.context.wait_idle()?;
        if let Some(frame) = self.frame_resources.take() {
            frame.destroy(&mut self.allocator);
        }
        if let Some(old) = self.texture.replace(texture) {
            old.destroy(&mut self.allocator);
        }
        self.rebuild_frame_resources()
    }

    /// Transform applied to every model before its own
    pub fn set_world_transform(&mut self, transform: Mat4) {
        self.world_transform = transform;
    }

    /// Feed a window event into the pointer input state
    pub fn handle_window_event(&mut self, event: &glfw::WindowEvent) {
        self.input.handle_window_event(event);
    }

    /// Duration of the last presented frame
    pub const fn last_frame_time(&self) -> Duration {
        self.timer.last_frame_time()
    }

    /// Frame timing statistics
    pub const fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    /// The orbit camera
    pub const fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    /// Mutable access to the orbit camera
    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    /// The device context
    pub const fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// The swapchain
    pub const fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// The resource pool
    pub const fn allocator(&self) -> &GpuAllocator {
        &self.allocator
    }

    /// Current frame resources, absent only after a failed resize
    pub const fn frame_resources(&self) -> Option<&FrameResources> {
        self.frame_resources.as_ref()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
