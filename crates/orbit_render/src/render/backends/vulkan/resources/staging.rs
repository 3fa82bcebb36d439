//! Staging uploads and image layout transitions
//!
//! All GPU-only memory is filled through [`StagingEngine`]: data goes into a
//! `CpuOnly` staging buffer, a one-shot command buffer copies it to the
//! destination, and the engine blocks on its fence before returning. The
//! destination is complete and visible once a call returns.
//!
//! Layout transitions come from a closed table ([`LayoutTransition::lookup`]).
//! A pair outside the table is rejected before anything is recorded.

use ash::{vk, Device};

use crate::render::backends::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::backends::vulkan::resources::allocator::{
    BufferAllocation, ImageAllocation, MemoryBackend, MemoryPolicy, ResourcePool,
};
use crate::render::backends::vulkan::state::sync::Fence;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// One row of the layout transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout the image is in before the barrier
    pub old: vk::ImageLayout,
    /// Layout the image is in after the barrier
    pub new: vk::ImageLayout,
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage the barrier waits on
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits on the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

const TRANSITIONS: [LayoutTransition; 3] = [
    LayoutTransition {
        old: vk::ImageLayout::UNDEFINED,
        new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    },
    LayoutTransition {
        old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::SHADER_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    },
    LayoutTransition {
        old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::TRANSFER_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    },
];

impl LayoutTransition {
    /// Find the table row for `old -> new`
    pub fn lookup(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<Self> {
        TRANSITIONS
            .iter()
            .find(|row| row.old == old && row.new == new)
            .copied()
            .ok_or(VulkanError::UnsupportedTransition { old, new })
    }

    /// All supported transitions
    pub const fn supported() -> &'static [Self] {
        &TRANSITIONS
    }

    /// Image memory barrier covering the first mip level and array layer
    pub fn barrier(&self, image: vk::Image, format: vk::Format) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(self.old)
            .new_layout(self.new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(single_level_range(aspect_mask(format)))
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .build()
    }
}

/// Aspect flags for views and barriers on an image of `format`
pub fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

fn single_level_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Check that `len` bytes fit at `byte_offset` in a buffer of `destination_size`
fn validate_buffer_upload(len: usize, byte_offset: vk::DeviceSize, destination_size: vk::DeviceSize) -> VulkanResult<()> {
    if len == 0 {
        return Err(VulkanError::invalid("Cannot upload an empty slice"));
    }
    let fits = byte_offset
        .checked_add(len as vk::DeviceSize)
        .is_some_and(|end| end <= destination_size);
    if fits {
        Ok(())
    } else {
        Err(VulkanError::invalid(format!(
            "Upload of {len} bytes at offset {byte_offset} exceeds destination size {destination_size}"
        )))
    }
}

/// Bytes per texel for the uncompressed formats `upload_image` accepts
fn texel_size(format: vk::Format) -> Option<vk::DeviceSize> {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => Some(1),
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SRGB => Some(2),
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT => Some(4),
        vk::Format::R16G16B16A16_SFLOAT => Some(8),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

/// Check that a `width` x `height` upload fits in the destination image and
/// that `len` bytes cover the whole region
fn validate_image_upload(
    len: usize,
    width: u32,
    height: u32,
    format: vk::Format,
    destination: vk::Extent3D,
) -> VulkanResult<()> {
    if len == 0 || width == 0 || height == 0 {
        return Err(VulkanError::invalid("Cannot upload an empty image region"));
    }
    if width > destination.width || height > destination.height {
        return Err(VulkanError::invalid(format!(
            "Upload of {width}x{height} exceeds destination image {}x{}",
            destination.width, destination.height
        )));
    }

    let texel = texel_size(format).ok_or_else(|| VulkanError::invalid(format!("Cannot upload texels of {format:?}")))?;
    let required = vk::DeviceSize::from(width) * vk::DeviceSize::from(height) * texel;
    if (len as vk::DeviceSize) < required {
        return Err(VulkanError::invalid(format!(
            "Upload of {width}x{height} {format:?} needs {required} bytes, got {len}"
        )));
    }
    Ok(())
}

fn buffer_image_copy(width: u32, height: u32) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D { width, height, depth: 1 },
    }
}

fn staging_buffer_info(len: usize) -> vk::BufferCreateInfo {
    vk::BufferCreateInfo::builder()
        .size(len as vk::DeviceSize)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .build()
}

/// Blocking upload engine on the graphics queue
///
/// Owns one command buffer and one fence, both reused for every submission.
pub struct StagingEngine {
    fence: Fence,
    command_buffer: vk::CommandBuffer,
    command_pool: CommandPool,
    queue: vk::Queue,
    device: Device,
}

impl StagingEngine {
    /// Create the engine's command pool, command buffer and fence
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.device().clone();
        let command_pool = CommandPool::new(device.clone(), context.queue_families().graphics)?;
        let command_buffer = command_pool.allocate_command_buffer()?;
        let fence = Fence::new(device.clone(), false)?;

        log::debug!("Staging engine ready");
        Ok(Self {
            fence,
            command_buffer,
            command_pool,
            queue: context.graphics_queue(),
            device,
        })
    }

    /// Copy `data` into `destination` at `byte_offset`
    pub fn upload_buffer<B: MemoryBackend>(
        &mut self,
        pool: &mut ResourcePool<B>,
        data: &[u8],
        destination: &BufferAllocation,
        byte_offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        validate_buffer_upload(data.len(), byte_offset, destination.size())?;

        let staging = pool.allocate_buffer(&staging_buffer_info(data.len()), MemoryPolicy::CpuOnly)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: byte_offset,
            size: data.len() as vk::DeviceSize,
        };

        let result = pool
            .write_buffer(&staging, 0, data)
            .and_then(|()| self.submit_once(|recorder| recorder.copy_buffer(staging.handle(), destination.handle(), region)));
        pool.free_buffer(&staging);
        result
    }

    /// Copy tightly packed texels into the first mip level of `destination`
    ///
    /// The image must already be in `TRANSFER_DST_OPTIMAL` layout.
    pub fn upload_image<B: MemoryBackend>(
        &mut self,
        pool: &mut ResourcePool<B>,
        data: &[u8],
        width: u32,
        height: u32,
        destination: &ImageAllocation,
    ) -> VulkanResult<()> {
        validate_image_upload(data.len(), width, height, destination.format(), destination.extent())?;

        let staging = pool.allocate_buffer(&staging_buffer_info(data.len()), MemoryPolicy::CpuOnly)?;
        let region = buffer_image_copy(width, height);

        let result = pool.write_buffer(&staging, 0, data).and_then(|()| {
            self.submit_once(|recorder| recorder.copy_buffer_to_image(staging.handle(), destination.handle(), region))
        });
        pool.free_buffer(&staging);
        result
    }

    /// Move `image` from `old` to `new` layout
    pub fn transition_image_layout(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let transition = LayoutTransition::lookup(old, new)?;
        let barrier = transition.barrier(image, format);

        self.submit_once(|recorder| recorder.image_barrier(transition.src_stage, transition.dst_stage, &barrier))
    }

    /// Record with `record`, submit, and block until the GPU is done
    fn submit_once<F>(&mut self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder<'_>) -> VulkanResult<()>,
    {
        let mut recorder = CommandRecorder::new(&self.device, self.command_buffer);
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder)?;
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        unsafe { self.device.queue_submit(self.queue, &[submit_info], self.fence.handle()) }
            .map_err(VulkanError::api("vkQueueSubmit"))?;
        self.fence.wait_and_reset()?;

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(VulkanError::api("vkResetCommandBuffer"))?;
        log::trace!("Staging submission complete");
        Ok(())
    }

    /// Pool the engine records from
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUTS: [vk::ImageLayout; 8] = [
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ];

    #[test]
    fn test_supported_transitions_resolve() {
        let upload = LayoutTransition::lookup(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(upload.src_access, vk::AccessFlags::empty());
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let sample = LayoutTransition::lookup(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(sample.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sample.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(sample.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let blit = LayoutTransition::lookup(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .unwrap();
        assert_eq!(blit.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(blit.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(blit.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_every_other_pair_is_unsupported() {
        let mut resolved = 0;
        for old in LAYOUTS {
            for new in LAYOUTS {
                match LayoutTransition::lookup(old, new) {
                    Ok(row) => {
                        assert!(LayoutTransition::supported().contains(&row));
                        resolved += 1;
                    }
                    Err(VulkanError::UnsupportedTransition { old: o, new: n }) => {
                        assert_eq!((o, n), (old, new));
                    }
                    Err(other) => panic!("unexpected error {other:?}"),
                }
            }
        }
        assert_eq!(resolved, LayoutTransition::supported().len());
    }

    #[test]
    fn test_barrier_matches_table_row() {
        let row = LayoutTransition::supported()[1];
        let barrier = row.barrier(vk::Image::null(), vk::Format::R8G8B8A8_SRGB);

        assert_eq!(barrier.old_layout, row.old);
        assert_eq!(barrier.new_layout, row.new);
        assert_eq!(barrier.src_access_mask, row.src_access);
        assert_eq!(barrier.dst_access_mask, row.dst_access);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.layer_count, 1);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn test_aspect_mask_by_format() {
        assert_eq!(aspect_mask(vk::Format::B8G8R8A8_SRGB), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_mask(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_buffer_upload_bounds() {
        assert!(validate_buffer_upload(16, 0, 16).is_ok());
        assert!(validate_buffer_upload(8, 8, 16).is_ok());
        assert!(validate_buffer_upload(0, 0, 16).is_err());
        assert!(validate_buffer_upload(8, 9, 16).is_err());
        assert!(validate_buffer_upload(1, u64::MAX, 16).is_err());
    }

    #[test]
    fn test_image_upload_bounds() {
        let rgba = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent3D { width: 4, height: 4, depth: 1 };
        assert!(validate_image_upload(64, 4, 4, rgba, extent).is_ok());
        assert!(validate_image_upload(64, 0, 4, rgba, extent).is_err());
        assert!(validate_image_upload(0, 4, 4, rgba, extent).is_err());
        assert!(validate_image_upload(100, 5, 5, rgba, extent).is_err());
    }

    #[test]
    fn test_image_upload_rejects_short_data() {
        let extent = vk::Extent3D { width: 4, height: 4, depth: 1 };
        assert!(validate_image_upload(10, 4, 4, vk::Format::R8G8B8A8_UNORM, extent).is_err());
        assert!(validate_image_upload(63, 4, 4, vk::Format::R8G8B8A8_UNORM, extent).is_err());
        assert!(validate_image_upload(16, 4, 4, vk::Format::R8_UNORM, extent).is_ok());
        assert!(validate_image_upload(16, 2, 2, vk::Format::R8G8B8A8_UNORM, extent).is_ok());
        assert!(validate_image_upload(1024, 4, 4, vk::Format::BC1_RGB_UNORM_BLOCK, extent).is_err());
    }

    #[test]
    fn test_image_copy_region_covers_base_level() {
        let region = buffer_image_copy(256, 128);
        assert_eq!(region.image_extent, vk::Extent3D { width: 256, height: 128, depth: 1 });
        assert_eq!(region.image_subresource.mip_level, 0);
        assert_eq!(region.image_subresource.layer_count, 1);
        assert_eq!(region.buffer_row_length, 0);
    }
}
