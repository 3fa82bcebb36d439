//! Descriptor set layouts, pools and writes
//!
//! The mesh pipeline uses a single set: binding 0 is the per-image uniform
//! buffer read by the vertex stage, binding 1 the combined image sampler read
//! by the fragment stage.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Binding slot of the uniform buffer in the mesh layout
pub const UNIFORM_BINDING: u32 = 0;

/// Binding slot of the texture sampler in the mesh layout
pub const SAMPLER_BINDING: u32 = 1;

/// Descriptor set layout builder for creating reusable layouts
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout used by the mesh pipeline
    pub fn mesh_layout() -> Self {
        Self::new()
            .add_uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(SAMPLER_BINDING, vk::ShaderStageFlags::FRAGMENT)
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn add(mut self, binding: u32, descriptor_type: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Pool sizes needed to allocate `set_count` sets of this layout
    pub fn pool_sizes(&self, set_count: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * set_count;
            match sizes.iter_mut().find(|size| size.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: count,
                }),
            }
        }
        sizes
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::api("vkCreateDescriptorSetLayout"))?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool sized for a fixed number of sets
///
/// Sets are freed together with the pool.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool holding `max_sets` sets with the given sizes
    pub fn new(device: Device, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::api("vkCreateDescriptorPool"))?;

        Ok(Self { pool, device })
    }

    /// Allocate `count` sets of `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout, count: usize) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::api("vkAllocateDescriptorSets"))
    }

    /// Get the pool handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingWrite {
    Buffer(vk::DescriptorSet, u32, vk::DescriptorBufferInfo),
    Image(vk::DescriptorSet, u32, vk::DescriptorImageInfo),
}

/// Batches descriptor writes and submits them in one update call
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `binding` of `set` at a whole uniform buffer
    pub fn write_buffer(mut self, set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        let info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        self.pending.push(PendingWrite::Buffer(set, binding, info));
        self
    }

    /// Point `binding` of `set` at a sampled image in shader-read layout
    pub fn write_image(mut self, set: vk::DescriptorSet, binding: u32, image_view: vk::ImageView, sampler: vk::Sampler) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        self.pending.push(PendingWrite::Image(set, binding, info));
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no writes are queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Execute all queued writes
    pub fn update(self, device: &Device) {
        // The info structs live in `self.pending` until the update call returns
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|write| match write {
                PendingWrite::Buffer(set, binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build(),
                PendingWrite::Image(set, binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
                    .build(),
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_layout_bindings() {
        let builder = DescriptorSetLayoutBuilder::mesh_layout();
        let bindings = builder.bindings();

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, UNIFORM_BINDING);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].binding, SAMPLER_BINDING);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_pool_sizes_scale_with_set_count() {
        let sizes = DescriptorSetLayoutBuilder::mesh_layout().pool_sizes(3);

        assert_eq!(sizes.len(), 2);
        assert!(sizes.iter().all(|size| size.descriptor_count == 3));
    }

    #[test]
    fn test_pool_sizes_merge_same_type() {
        let sizes = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT)
            .pool_sizes(2);

        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].descriptor_count, 4);
    }

    #[test]
    fn test_writer_queues_writes() {
        let writer = DescriptorSetWriter::new()
            .write_buffer(vk::DescriptorSet::null(), UNIFORM_BINDING, vk::Buffer::null(), 192)
            .write_image(
                vk::DescriptorSet::null(),
                SAMPLER_BINDING,
                vk::ImageView::null(),
                vk::Sampler::null(),
            );
        assert_eq!(writer.len(), 2);
    }
}
