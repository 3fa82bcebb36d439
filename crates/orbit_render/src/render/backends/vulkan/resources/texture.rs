//! Sampled 2D textures
//!
//! RGBA8 sRGB images uploaded through the staging engine, with one view and
//! one linear/repeat sampler each. Image memory belongs to the pool; hand a
//! texture back with [`Texture::destroy`].

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::allocator::{ImageAllocation, MemoryBackend, MemoryPolicy, ResourcePool};
use crate::render::backends::vulkan::resources::staging::StagingEngine;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Texel format of every texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// GPU texture with image view and sampler
pub struct Texture {
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image: ImageAllocation,
    device: Device,
}

impl Texture {
    /// Upload tightly packed RGBA8 pixels
    pub fn from_rgba8<B: MemoryBackend>(
        context: &VulkanContext,
        pool: &mut ResourcePool<B>,
        staging: &mut StagingEngine,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<Self> {
        let expected = rgba8_len(width, height)
            .ok_or_else(|| VulkanError::invalid(format!("Texture size {width}x{height} is not representable")))?;
        if pixels.len() != expected {
            return Err(VulkanError::invalid(format!(
                "Expected {expected} bytes for a {width}x{height} RGBA8 texture, got {}",
                pixels.len()
            )));
        }

        let image = pool.allocate_image(&image_info(width, height), MemoryPolicy::GpuOnly)?;

        if let Err(e) = Self::fill(staging, pool, &image, width, height, pixels) {
            pool.free_image(&image);
            return Err(e);
        }

        let mut texture = Self {
            sampler: vk::Sampler::null(),
            image_view: vk::ImageView::null(),
            image,
            device: context.device().clone(),
        };

        let created = texture.create_view_and_sampler(context);
        if let Err(e) = created {
            texture.destroy(pool);
            return Err(e);
        }

        log::debug!("Created {}x{} texture", width, height);
        Ok(texture)
    }

    /// Opaque white 1x1 texture used when a model has none
    pub fn white<B: MemoryBackend>(
        context: &VulkanContext,
        pool: &mut ResourcePool<B>,
        staging: &mut StagingEngine,
    ) -> VulkanResult<Self> {
        Self::from_rgba8(context, pool, staging, 1, 1, &[255, 255, 255, 255])
    }

    fn fill<B: MemoryBackend>(
        staging: &mut StagingEngine,
        pool: &mut ResourcePool<B>,
        image: &ImageAllocation,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<()> {
        staging.transition_image_layout(
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        staging.upload_image(pool, pixels, width, height, image)?;
        staging.transition_image_layout(
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    fn create_view_and_sampler(&mut self, context: &VulkanContext) -> VulkanResult<()> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        self.image_view = unsafe { self.device.create_image_view(&view_info, None) }
            .map_err(VulkanError::api("vkCreateImageView"))?;

        let anisotropy = context
            .anisotropy_enabled()
            .then_some(context.physical_device_info().properties.limits.max_sampler_anisotropy);
        self.sampler = unsafe { self.device.create_sampler(&sampler_info(anisotropy), None) }
            .map_err(VulkanError::api("vkCreateSampler"))?;
        Ok(())
    }

    /// Get the image view
    pub const fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Get the sampler
    pub const fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Pool record of the backing image
    pub const fn image(&self) -> &ImageAllocation {
        &self.image
    }

    /// Destroy the view and sampler and hand the image back to the pool
    pub fn destroy<B: MemoryBackend>(mut self, pool: &mut ResourcePool<B>) {
        self.destroy_view_and_sampler();
        pool.free_image(&self.image);
    }

    fn destroy_view_and_sampler(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
                self.sampler = vk::Sampler::null();
            }
            if self.image_view != vk::ImageView::null() {
                self.device.destroy_image_view(self.image_view, None);
                self.image_view = vk::ImageView::null();
            }
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // The image itself is released by the pool
        self.destroy_view_and_sampler();
    }
}

/// Byte length of a tightly packed RGBA8 image
fn rgba8_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

fn image_info(width: u32, height: u32) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D { width, height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .format(TEXTURE_FORMAT)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1)
        .build()
}

/// Linear, repeating sampler; anisotropic when a limit is given
fn sampler_info(max_anisotropy: Option<f32>) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(max_anisotropy.is_some())
        .max_anisotropy(max_anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .build()
}
