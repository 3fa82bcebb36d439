//! Per-swapchain frame resources
//!
//! Everything that depends on the swapchain images: render pass, one
//! framebuffer, descriptor set and uniform buffer per image, the pipeline,
//! and the single command buffer and fence the frame loop reuses. The whole
//! set is destroyed before the swapchain is recreated and rebuilt after.

use ash::{vk, Device};

use crate::config::ShaderConfig;
use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::rendering::render_pass::RenderPass;
use crate::render::backends::vulkan::rendering::shader::{GraphicsPipeline, ShaderModule};
use crate::render::backends::vulkan::resources::allocator::{MemoryBackend, ResourcePool};
use crate::render::backends::vulkan::resources::descriptor_set::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter, SAMPLER_BINDING,
    UNIFORM_BINDING,
};
use crate::render::backends::vulkan::resources::model::Model;
use crate::render::backends::vulkan::resources::texture::Texture;
use crate::render::backends::vulkan::resources::uniform_buffer::{UniformBufferObject, UniformBuffers};
use crate::render::backends::vulkan::state::framebuffer::Framebuffers;
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::state::sync::Fence;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Frame resources bound to one swapchain generation
///
/// Field order is drop order. Uniform buffer memory belongs to the pool and
/// is returned by [`FrameResources::destroy`].
pub struct FrameResources {
    fence: Fence,
    command_buffer: vk::CommandBuffer,
    command_pool: CommandPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    pipeline: GraphicsPipeline,
    descriptor_set_layout: DescriptorSetLayout,
    framebuffers: Framebuffers,
    render_pass: RenderPass,
    uniforms: UniformBuffers,
    device: Device,
}

impl FrameResources {
    /// Build frame resources for the current swapchain images
    pub fn new<B: MemoryBackend>(
        context: &VulkanContext,
        swapchain: &Swapchain,
        pool: &mut ResourcePool<B>,
        shaders: &ShaderConfig,
        texture: &Texture,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();
        let image_count = swapchain.image_count();
        let set_count = u32::try_from(image_count)
            .map_err(|_| VulkanError::invalid(format!("Unsupported swapchain image count {image_count}")))?;

        let render_pass = RenderPass::new_color_pass(device.clone(), swapchain.format().format)?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            render_pass.handle(),
            swapchain.image_views(),
            swapchain.extent(),
        )?;

        let layout_builder = DescriptorSetLayoutBuilder::mesh_layout();
        let pool_sizes = layout_builder.pool_sizes(set_count);
        let descriptor_set_layout = layout_builder.build(&device)?;

        let vertex_shader = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            &vertex_shader,
            &fragment_shader,
            descriptor_set_layout.handle(),
        )?;

        let descriptor_pool = DescriptorPool::new(device.clone(), set_count, &pool_sizes)?;
        let descriptor_sets = descriptor_pool.allocate(&descriptor_set_layout, image_count)?;

        let command_pool = CommandPool::new(device.clone(), context.queue_families().graphics)?;
        let command_buffer = command_pool.allocate_command_buffer()?;
        let fence = Fence::new(device.clone(), false)?;

        // Last fallible step, so nothing else needs unwinding if it fails
        let uniforms = UniformBuffers::new(pool, image_count)?;

        let mut writer = DescriptorSetWriter::new();
        for (index, &set) in descriptor_sets.iter().enumerate() {
            if let Some(buffer) = uniforms.buffer(index) {
                writer = writer
                    .write_buffer(set, UNIFORM_BINDING, buffer.handle(), UniformBufferObject::size())
                    .write_image(set, SAMPLER_BINDING, texture.image_view(), texture.sampler());
            }
        }
        writer.update(&device);

        log::debug!("Frame resources ready for {} swapchain images", image_count);
        Ok(Self {
            fence,
            command_buffer,
            command_pool,
            descriptor_sets,
            descriptor_pool,
            pipeline,
            descriptor_set_layout,
            framebuffers,
            render_pass,
            uniforms,
            device,
        })
    }

    /// Write the uniform slot for `image_index`
    pub fn update_uniforms<B: MemoryBackend>(
        &self,
        pool: &mut ResourcePool<B>,
        image_index: usize,
        ubo: &UniformBufferObject,
    ) -> VulkanResult<()> {
        self.uniforms.write(pool, image_index, ubo)
    }

    /// Record the draw commands for `image_index` into the frame command buffer
    pub fn record(&self, image_index: usize, extent: vk::Extent2D, clear_color: [f32; 4], models: &[Model]) -> VulkanResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index)
            .ok_or_else(|| VulkanError::invalid(format!("No framebuffer for image {image_index}")))?;
        let descriptor_set = *self
            .descriptor_sets
            .get(image_index)
            .ok_or_else(|| VulkanError::invalid(format!("No descriptor set for image {image_index}")))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];

        let mut recorder = CommandRecorder::new(&self.device, self.command_buffer);
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer,
                full_scissor(extent),
                &clear_values,
            )?;
            pass.bind_pipeline(self.pipeline.handle());
            pass.set_viewport(&full_viewport(extent));
            pass.set_scissor(&full_scissor(extent));
            pass.bind_descriptor_set(self.pipeline.layout(), descriptor_set);
            for model in models {
                model.draw(&mut pass, self.pipeline.layout());
            }
        }
        recorder.end()?;
        Ok(())
    }

    /// Submit the recorded commands
    ///
    /// Waits on `wait_semaphore` at color attachment output and signals both
    /// `signal_semaphore` and the frame fence.
    pub fn submit(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, signal_semaphore: vk::Semaphore) -> VulkanResult<()> {
        let wait_semaphores = [wait_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [signal_semaphore];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe { self.device.queue_submit(queue, &[submit_info], self.fence.handle()) }
            .map_err(VulkanError::api("vkQueueSubmit"))
    }

    /// Block until the last submission finished, then reset the fence
    pub fn wait_for_completion(&self) -> VulkanResult<()> {
        self.fence.wait_and_reset()
    }

    /// Number of framebuffers, one per swapchain image
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of descriptor sets, one per swapchain image
    pub fn descriptor_set_count(&self) -> usize {
        self.descriptor_sets.len()
    }

    /// Number of uniform buffers, one per swapchain image
    pub fn uniform_buffer_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Pool the frame command buffer comes from
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Descriptor pool backing the per-image sets
    pub const fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// Descriptor set layout of the mesh pipeline
    pub const fn descriptor_set_layout(&self) -> &DescriptorSetLayout {
        &self.descriptor_set_layout
    }

    /// Return the uniform buffers to the pool and release everything else
    ///
    /// The device must be idle.
    pub fn destroy<B: MemoryBackend>(self, pool: &mut ResourcePool<B>) {
        let Self { uniforms, .. } = self;
        uniforms.destroy(pool);
        log::debug!("Frame resources destroyed");
    }
}

/// Viewport covering the whole extent with depth 0..1
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole extent
pub const fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.height, 600.0);
        assert_relative_eq!(viewport.min_depth, 0.0);
        assert_relative_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_scissor_covers_extent() {
        let extent = vk::Extent2D { width: 1280, height: 720 };
        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, extent);
    }
}
