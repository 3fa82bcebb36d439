//! Framebuffer management
//!
//! One framebuffer per swapchain image view, all sharing the render pass.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Framebuffers indexed by swapchain image, with RAII cleanup
pub struct Framebuffers {
    device: Device,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    /// Create one framebuffer for each of `image_views`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let mut framebuffers = Self {
            device,
            framebuffers: Vec::with_capacity(image_views.len()),
        };

        for view in image_views {
            let attachments = [*view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // Already created framebuffers are released by Drop on error
            let framebuffer = unsafe { framebuffers.device.create_framebuffer(&create_info, None) }
                .map_err(VulkanError::api("vkCreateFramebuffer"))?;
            framebuffers.framebuffers.push(framebuffer);
        }

        log::debug!("Created {} framebuffers at {}x{}", image_views.len(), extent.width, extent.height);
        Ok(framebuffers)
    }

    /// Framebuffer for `image_index`
    pub fn get(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index).copied()
    }

    /// Number of framebuffers
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// Whether there are no framebuffers
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
