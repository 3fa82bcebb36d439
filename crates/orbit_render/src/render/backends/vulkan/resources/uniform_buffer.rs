//! Per-image uniform buffers
//!
//! One persistently mapped `CpuToGpu` buffer per swapchain image. The frame
//! loop writes the slot selected by the acquired image index, so the CPU never
//! touches a buffer the GPU may still be reading for another image.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_cols_array, Mat4};
use crate::render::backends::vulkan::resources::allocator::{BufferAllocation, MemoryBackend, MemoryPolicy, ResourcePool};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Model, view and projection matrices as the vertex shader reads them
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Object to world transform
    pub model: [[f32; 4]; 4],
    /// World to camera transform
    pub view: [[f32; 4]; 4],
    /// Camera to clip transform
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Pack nalgebra matrices into the shader layout
    pub fn new(model: &Mat4, view: &Mat4, proj: &Mat4) -> Self {
        Self {
            model: to_cols_array(model),
            view: to_cols_array(view),
            proj: to_cols_array(proj),
        }
    }

    /// Size of one uniform slot in bytes
    pub const fn size() -> vk::DeviceSize {
        std::mem::size_of::<Self>() as vk::DeviceSize
    }
}

/// Uniform buffers indexed by swapchain image
pub struct UniformBuffers {
    buffers: Vec<BufferAllocation>,
}

impl UniformBuffers {
    /// Allocate `count` mapped uniform buffers from `pool`
    ///
    /// Buffers allocated before a failure are handed back to the pool.
    pub fn new<B: MemoryBackend>(pool: &mut ResourcePool<B>, count: usize) -> VulkanResult<Self> {
        let info = vk::BufferCreateInfo::builder()
            .size(UniformBufferObject::size())
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();

        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            match pool.allocate_buffer(&info, MemoryPolicy::CpuToGpu) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    Self { buffers }.destroy(pool);
                    return Err(e);
                }
            }
        }

        log::debug!("Created {} uniform buffers", count);
        Ok(Self { buffers })
    }

    /// Write `ubo` into the slot for `image_index`
    pub fn write<B: MemoryBackend>(
        &self,
        pool: &mut ResourcePool<B>,
        image_index: usize,
        ubo: &UniformBufferObject,
    ) -> VulkanResult<()> {
        let buffer = self
            .buffers
            .get(image_index)
            .ok_or_else(|| VulkanError::invalid(format!("No uniform buffer for image {image_index}")))?;
        pool.write_buffer(buffer, 0, bytemuck::bytes_of(ubo))
    }

    /// Buffer record for `image_index`
    pub fn buffer(&self, image_index: usize) -> Option<&BufferAllocation> {
        self.buffers.get(image_index)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Hand every buffer back to the pool
    pub fn destroy<B: MemoryBackend>(self, pool: &mut ResourcePool<B>) {
        for buffer in &self.buffers {
            pool.free_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::backends::vulkan::resources::allocator::mock::MockBackend;

    #[test]
    fn test_ubo_layout() {
        assert_eq!(UniformBufferObject::size(), 192);
        let ubo = UniformBufferObject::new(&Mat4::identity(), &Mat4::identity(), &Mat4::identity());
        assert_eq!(bytemuck::bytes_of(&ubo).len(), 192);
    }

    #[test]
    fn test_ubo_packs_column_major() {
        let model = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let ubo = UniformBufferObject::new(&model, &Mat4::identity(), &Mat4::identity());

        assert_eq!(ubo.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(ubo.view[0], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_one_buffer_per_image() {
        let mut pool = ResourcePool::new(MockBackend::default());
        let uniforms = UniformBuffers::new(&mut pool, 3).unwrap();

        assert_eq!(uniforms.len(), 3);
        assert_eq!(pool.live_buffer_count(), 3);
        assert!(uniforms.buffer(2).is_some());
        assert!(uniforms.buffer(3).is_none());

        uniforms.destroy(&mut pool);
        assert_eq!(pool.live_buffer_count(), 0);
    }

    #[test]
    fn test_write_lands_in_selected_slot() {
        let mut pool = ResourcePool::new(MockBackend::default());
        let uniforms = UniformBuffers::new(&mut pool, 2).unwrap();
        let model = Mat4::new_scaling(2.0);
        let ubo = UniformBufferObject::new(&model, &Mat4::identity(), &Mat4::identity());

        uniforms.write(&mut pool, 1, &ubo).unwrap();

        let size = std::mem::size_of::<UniformBufferObject>();
        let written = pool.read_buffer(uniforms.buffer(1).unwrap(), 0, size).unwrap();
        let untouched = pool.read_buffer(uniforms.buffer(0).unwrap(), 0, size).unwrap();
        assert_eq!(written, bytemuck::bytes_of(&ubo));
        assert!(untouched.iter().all(|&b| b == 0));

        assert!(uniforms.write(&mut pool, 2, &ubo).is_err());
    }

    #[test]
    fn test_failed_creation_returns_partial_buffers() {
        let mut pool = ResourcePool::new(MockBackend::default());
        let first = UniformBuffers::new(&mut pool, 1).unwrap();
        pool.backend_mut().fail_next = Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        assert!(UniformBuffers::new(&mut pool, 2).is_err());
        assert_eq!(pool.live_buffer_count(), 1);
        first.destroy(&mut pool);
    }
}
