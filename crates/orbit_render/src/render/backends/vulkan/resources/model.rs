//! Models: meshes packed into one vertex buffer and one index buffer
//!
//! Each mesh is uploaded at increasing byte offsets and becomes a
//! [`Primitive`] drawn with its own first index and vertex offset. The pool
//! owns the GPU memory; a model keeps only the two records and hands them
//! back in [`Model::destroy`].

use ash::vk;
use std::mem::size_of;

use crate::foundation::math::{to_cols_array, Mat4};
use crate::render::backends::vulkan::rendering::commands::ActiveRenderPass;
use crate::render::backends::vulkan::resources::allocator::{BufferAllocation, MemoryBackend, MemoryPolicy, ResourcePool};
use crate::render::backends::vulkan::resources::staging::StagingEngine;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::mesh::{MeshData, Vertex};

/// Contiguous index range of the shared index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    /// First index within the shared index buffer
    pub first_index: u32,
    /// Number of indices to draw
    pub index_count: u32,
    /// Added to every index before fetching a vertex
    pub vertex_offset: i32,
}

/// Byte layout of a set of meshes inside the shared buffers
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackedLayout {
    primitives: Vec<Primitive>,
    vertex_bytes: vk::DeviceSize,
    index_bytes: vk::DeviceSize,
}

const VERTEX_SIZE: vk::DeviceSize = size_of::<Vertex>() as vk::DeviceSize;
const INDEX_SIZE: vk::DeviceSize = size_of::<u32>() as vk::DeviceSize;

fn pack(meshes: &[MeshData]) -> VulkanResult<PackedLayout> {
    if meshes.is_empty() {
        return Err(VulkanError::invalid("A model needs at least one mesh"));
    }

    let mut primitives = Vec::with_capacity(meshes.len());
    let mut vertex_count: u32 = 0;
    let mut index_count: u32 = 0;

    for (i, mesh) in meshes.iter().enumerate() {
        if mesh.is_empty() {
            return Err(VulkanError::invalid(format!("Mesh {i} has no geometry")));
        }
        mesh.validate()
            .map_err(|reason| VulkanError::invalid(format!("Mesh {i}: {reason}")))?;

        let too_large = || VulkanError::invalid(format!("Mesh {i} overflows the shared buffers"));
        let mesh_vertices = u32::try_from(mesh.vertices.len()).map_err(|_| too_large())?;
        let mesh_indices = u32::try_from(mesh.indices.len()).map_err(|_| too_large())?;

        primitives.push(Primitive {
            first_index: index_count,
            index_count: mesh_indices,
            vertex_offset: i32::try_from(vertex_count).map_err(|_| too_large())?,
        });

        vertex_count = vertex_count.checked_add(mesh_vertices).ok_or_else(too_large)?;
        index_count = index_count.checked_add(mesh_indices).ok_or_else(too_large)?;
    }

    Ok(PackedLayout {
        primitives,
        vertex_bytes: vk::DeviceSize::from(vertex_count) * VERTEX_SIZE,
        index_bytes: vk::DeviceSize::from(index_count) * INDEX_SIZE,
    })
}

fn device_buffer_info(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> vk::BufferCreateInfo {
    vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage | vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .build()
}

/// Uploaded geometry plus a mutable transform
pub struct Model {
    vertex_buffer: BufferAllocation,
    index_buffer: BufferAllocation,
    primitives: Vec<Primitive>,
    /// Object to world transform
    pub transform: Mat4,
}

impl Model {
    /// Upload `meshes` into dedicated device-local vertex and index buffers
    pub fn upload<B: MemoryBackend>(
        pool: &mut ResourcePool<B>,
        staging: &mut StagingEngine,
        meshes: &[MeshData],
    ) -> VulkanResult<Self> {
        let layout = pack(meshes)?;

        let vertex_buffer = pool.allocate_buffer(
            &device_buffer_info(layout.vertex_bytes, vk::BufferUsageFlags::VERTEX_BUFFER),
            MemoryPolicy::GpuOnlyDedicated,
        )?;
        let index_buffer = match pool.allocate_buffer(
            &device_buffer_info(layout.index_bytes, vk::BufferUsageFlags::INDEX_BUFFER),
            MemoryPolicy::GpuOnlyDedicated,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                pool.free_buffer(&vertex_buffer);
                return Err(e);
            }
        };

        let model = Self {
            vertex_buffer,
            index_buffer,
            primitives: layout.primitives,
            transform: Mat4::identity(),
        };

        if let Err(e) = model.fill(pool, staging, meshes) {
            model.destroy(pool);
            return Err(e);
        }

        log::info!(
            "Uploaded model: {} primitive(s), {} vertex bytes, {} index bytes",
            model.primitives.len(),
            layout.vertex_bytes,
            layout.index_bytes
        );
        Ok(model)
    }

    fn fill<B: MemoryBackend>(
        &self,
        pool: &mut ResourcePool<B>,
        staging: &mut StagingEngine,
        meshes: &[MeshData],
    ) -> VulkanResult<()> {
        for (mesh, primitive) in meshes.iter().zip(&self.primitives) {
            let vertex_offset = vk::DeviceSize::from(primitive.vertex_offset.unsigned_abs()) * VERTEX_SIZE;
            let index_offset = vk::DeviceSize::from(primitive.first_index) * INDEX_SIZE;

            staging.upload_buffer(pool, mesh.vertex_bytes(), &self.vertex_buffer, vertex_offset)?;
            staging.upload_buffer(pool, mesh.index_bytes(), &self.index_buffer, index_offset)?;
        }
        Ok(())
    }

    /// Push the transform, bind the shared buffers and issue one indexed draw
    /// per primitive
    pub fn draw(&self, pass: &mut ActiveRenderPass<'_, '_>, layout: vk::PipelineLayout) {
        let transform = to_cols_array(&self.transform);
        pass.push_vertex_constants(layout, bytemuck::bytes_of(&transform));
        pass.bind_vertex_buffer(self.vertex_buffer.handle(), 0);
        pass.bind_index_buffer(self.index_buffer.handle(), 0);
        for primitive in &self.primitives {
            pass.draw_indexed(primitive.index_count, primitive.first_index, primitive.vertex_offset);
        }
    }

    /// Primitives in upload order
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Shared vertex buffer record
    pub const fn vertex_buffer(&self) -> &BufferAllocation {
        &self.vertex_buffer
    }

    /// Shared index buffer record
    pub const fn index_buffer(&self) -> &BufferAllocation {
        &self.index_buffer
    }

    /// Hand both buffers back to the pool
    pub fn destroy<B: MemoryBackend>(self, pool: &mut ResourcePool<B>) {
        pool.free_buffer(&self.vertex_buffer);
        pool.free_buffer(&self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_mesh_layout() {
        let layout = pack(&[MeshData::quad()]).unwrap();

        assert_eq!(
            layout.primitives,
            vec![Primitive {
                first_index: 0,
                index_count: 6,
                vertex_offset: 0
            }]
        );
        assert_eq!(layout.vertex_bytes, 4 * 32);
        assert_eq!(layout.index_bytes, 6 * 4);
    }

    #[test]
    fn test_meshes_pack_at_increasing_offsets() {
        let layout = pack(&[MeshData::quad(), MeshData::cube(), MeshData::quad()]).unwrap();
        let p = &layout.primitives;

        assert_eq!((p[0].first_index, p[0].vertex_offset), (0, 0));
        assert_eq!((p[1].first_index, p[1].vertex_offset), (6, 4));
        assert_eq!((p[2].first_index, p[2].vertex_offset), (42, 28));
        assert_eq!(p[1].index_count, 36);
        assert_eq!(layout.vertex_bytes, (4 + 24 + 4) * 32);
        assert_eq!(layout.index_bytes, (6 + 36 + 6) * 4);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(pack(&[]).is_err());
        assert!(pack(&[MeshData::quad(), MeshData::default()]).is_err());
    }

    #[test]
    fn test_invalid_indices_rejected() {
        let mut broken = MeshData::quad();
        broken.indices[5] = 99;
        assert!(matches!(pack(&[broken]), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_buffers_are_transfer_targets() {
        let info = device_buffer_info(64, vk::BufferUsageFlags::VERTEX_BUFFER);
        assert!(info
            .usage
            .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
    }
}
