//! Command buffer management
//!
//! Recording goes through [`CommandRecorder`]; a render pass is open exactly
//! as long as its [`ActiveRenderPass`] guard lives.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }
            .map_err(VulkanError::api("vkCreateCommandPool"))?;

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(VulkanError::api("vkAllocateCommandBuffers"))
    }

    /// Allocate a single primary command buffer
    pub fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        self.allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("Driver returned no command buffer"))
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffers
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Command buffer recorder with begin/end state tracking
pub struct CommandRecorder<'d> {
    device: &'d Device,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl<'d> CommandRecorder<'d> {
    /// Wrap a command buffer that is not currently recording
    pub const fn new(device: &'d Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            recording: false,
        }
    }

    /// Reset the command buffer, then begin recording
    pub fn begin(&mut self, usage: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::invalid("Command buffer already recording"));
        }

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::api("vkResetCommandBuffer"))?;

            let begin_info = vk::CommandBufferBeginInfo::builder().flags(usage);
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::api("vkBeginCommandBuffer"))?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Begin a render pass with inline contents
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_, 'd>> {
        self.ensure_recording()?;

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// Record a pipeline barrier with a single image memory barrier
    pub fn image_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) -> VulkanResult<()> {
        self.ensure_recording()?;
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            );
        }
        Ok(())
    }

    /// Record a buffer to buffer copy
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy) -> VulkanResult<()> {
        self.ensure_recording()?;
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
        Ok(())
    }

    /// Record a buffer to image copy; the image must be in transfer-dst layout
    pub fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        region: vk::BufferImageCopy,
    ) -> VulkanResult<()> {
        self.ensure_recording()?;
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        self.ensure_recording()?;

        unsafe { self.device.end_command_buffer(self.command_buffer) }
            .map_err(VulkanError::api("vkEndCommandBuffer"))?;

        self.recording = false;
        Ok(self.command_buffer)
    }

    fn ensure_recording(&self) -> VulkanResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(VulkanError::invalid("Command buffer not recording"))
        }
    }
}

/// Render pass scope; the pass ends when this guard drops
pub struct ActiveRenderPass<'r, 'd> {
    recorder: &'r mut CommandRecorder<'d>,
}

impl ActiveRenderPass<'_, '_> {
    /// Set viewport
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe {
            self.recorder
                .device
                .cmd_set_viewport(self.recorder.command_buffer, 0, std::slice::from_ref(viewport));
        }
    }

    /// Set scissor
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe {
            self.recorder
                .device
                .cmd_set_scissor(self.recorder.command_buffer, 0, std::slice::from_ref(scissor));
        }
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind a descriptor set at set index 0
    pub fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    /// Push constants visible to the vertex stage
    pub fn push_vertex_constants(&mut self, layout: vk::PipelineLayout, bytes: &[u8]) {
        unsafe {
            self.recorder.device.cmd_push_constants(
                self.recorder.command_buffer,
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytes,
            );
        }
    }

    /// Bind one vertex buffer at binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_vertex_buffers(self.recorder.command_buffer, 0, &[buffer], &[offset]);
        }
    }

    /// Bind a 32-bit index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.recorder.device.cmd_bind_index_buffer(
                self.recorder.command_buffer,
                buffer,
                offset,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Draw indexed
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.recorder.device.cmd_draw_indexed(
                self.recorder.command_buffer,
                index_count,
                1,
                first_index,
                vertex_offset,
                0,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
