//! GPU memory pool
//!
//! Every buffer and image in the renderer is created and destroyed through
//! [`ResourcePool`]. The pool keeps a live set per resource kind; the set is
//! the source of truth for bulk teardown, so anything not freed explicitly is
//! released when the pool is torn down or dropped.
//!
//! The native allocator sits behind [`MemoryBackend`]. Production code uses
//! [`VmaBackend`] on top of `vk-mem`.

use ash::vk;
use slotmap::{new_key_type, Key, SlotMap};
use std::ptr::NonNull;
use std::rc::Rc;
use vk_mem::Alloc;

use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

new_key_type! {
    /// Live-set key of a pooled buffer
    pub struct BufferKey;
    /// Live-set key of a pooled image
    pub struct ImageKey;
}

/// Where the memory for a resource should live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPolicy {
    /// Device-local memory, never mapped
    GpuOnly,
    /// Device-local memory in its own dedicated allocation
    GpuOnlyDedicated,
    /// Host-visible coherent memory, persistently mapped, written every frame
    CpuToGpu,
    /// Host-visible coherent memory, persistently mapped, used for staging and readback
    CpuOnly,
}

impl MemoryPolicy {
    /// Whether allocations with this policy are mapped for their whole lifetime
    pub const fn is_host_visible(self) -> bool {
        matches!(self, Self::CpuToGpu | Self::CpuOnly)
    }
}

/// Native allocator seam used by [`ResourcePool`]
pub trait MemoryBackend {
    /// Opaque per-allocation handle
    type Allocation;

    /// Create a buffer and bind memory for it
    fn create_buffer(
        &mut self,
        info: &vk::BufferCreateInfo,
        policy: MemoryPolicy,
    ) -> VulkanResult<(vk::Buffer, Self::Allocation)>;

    /// Create an image and bind memory for it
    fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo,
        policy: MemoryPolicy,
    ) -> VulkanResult<(vk::Image, Self::Allocation)>;

    /// Map a host-visible allocation
    fn map(&mut self, allocation: &mut Self::Allocation) -> VulkanResult<*mut u8>;

    /// Unmap an allocation previously mapped with [`MemoryBackend::map`]
    fn unmap(&mut self, allocation: &mut Self::Allocation);

    /// Destroy a buffer and free its memory
    fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: Self::Allocation);

    /// Destroy an image and free its memory
    fn destroy_image(&mut self, image: vk::Image, allocation: Self::Allocation);

    /// Number of allocations the native allocator still holds
    fn active_allocations(&self) -> usize;
}

/// Handle to a pooled buffer
///
/// Equality is the (buffer handle, allocation id) pair; copies of a record
/// compare equal, a record for a re-used handle does not.
#[derive(Debug, Clone, Copy)]
pub struct BufferAllocation {
    key: BufferKey,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

impl BufferAllocation {
    /// Native buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Persistent mapping, present for host-visible policies
    pub const fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.mapped
    }

    /// Allocation id within the pool
    pub fn id(&self) -> u64 {
        self.key.data().as_ffi()
    }
}

impl PartialEq for BufferAllocation {
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer && self.key == other.key
    }
}

impl Eq for BufferAllocation {}

/// Handle to a pooled image
#[derive(Debug, Clone, Copy)]
pub struct ImageAllocation {
    key: ImageKey,
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent3D,
}

impl ImageAllocation {
    /// Native image handle
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// Image format
    pub const fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent
    pub const fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Allocation id within the pool
    pub fn id(&self) -> u64 {
        self.key.data().as_ffi()
    }
}

impl PartialEq for ImageAllocation {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image && self.key == other.key
    }
}

impl Eq for ImageAllocation {}

struct BufferEntry<A> {
    buffer: vk::Buffer,
    allocation: A,
    size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

struct ImageEntry<A> {
    image: vk::Image,
    allocation: A,
}

/// Pool of every live GPU buffer and image
///
/// Single-threaded: the live sets are mutated only through `&mut self`.
pub struct ResourcePool<B: MemoryBackend = VmaBackend> {
    buffers: SlotMap<BufferKey, BufferEntry<B::Allocation>>,
    images: SlotMap<ImageKey, ImageEntry<B::Allocation>>,
    backend: B,
}

/// Pool backed by the Vulkan Memory Allocator
pub type GpuAllocator = ResourcePool<VmaBackend>;

impl GpuAllocator {
    /// Create a pool on top of a fresh VMA allocator for `context`
    pub fn from_context(context: &VulkanContext) -> VulkanResult<Self> {
        Ok(Self::new(VmaBackend::new(context)?))
    }
}

impl<B: MemoryBackend> ResourcePool<B> {
    /// Wrap a native allocator
    pub fn new(backend: B) -> Self {
        Self {
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            backend,
        }
    }

    /// Create a buffer with memory chosen by `policy`
    ///
    /// Host-visible policies come back persistently mapped.
    pub fn allocate_buffer(
        &mut self,
        info: &vk::BufferCreateInfo,
        policy: MemoryPolicy,
    ) -> VulkanResult<BufferAllocation> {
        if info.size == 0 {
            return Err(VulkanError::invalid("Cannot allocate a zero-sized buffer"));
        }

        let (buffer, mut allocation) = self.backend.create_buffer(info, policy)?;

        let mapped = if policy.is_host_visible() {
            match self.backend.map(&mut allocation) {
                Ok(ptr) => NonNull::new(ptr),
                Err(e) => {
                    self.backend.destroy_buffer(buffer, allocation);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let key = self.buffers.insert(BufferEntry {
            buffer,
            allocation,
            size: info.size,
            mapped,
        });
        log::debug!("Allocated buffer {:?} ({} bytes, {:?})", buffer, info.size, policy);

        Ok(BufferAllocation {
            key,
            buffer,
            size: info.size,
            mapped,
        })
    }

    /// Create an image with memory chosen by `policy`
    pub fn allocate_image(&mut self, info: &vk::ImageCreateInfo, policy: MemoryPolicy) -> VulkanResult<ImageAllocation> {
        if info.extent.width == 0 || info.extent.height == 0 || info.extent.depth == 0 {
            return Err(VulkanError::invalid("Cannot allocate an image with a zero extent"));
        }
        if policy.is_host_visible() {
            return Err(VulkanError::invalid("Images are always allocated in device memory"));
        }

        let (image, allocation) = self.backend.create_image(info, policy)?;
        let key = self.images.insert(ImageEntry { image, allocation });
        log::debug!(
            "Allocated image {:?} ({}x{} {:?})",
            image,
            info.extent.width,
            info.extent.height,
            info.format
        );

        Ok(ImageAllocation {
            key,
            image,
            format: info.format,
            extent: info.extent,
        })
    }

    /// Destroy a buffer and remove it from the live set
    ///
    /// Returns `false` without touching the GPU when the record is not live,
    /// which means it was freed already or never came from this pool.
    pub fn free_buffer(&mut self, record: &BufferAllocation) -> bool {
        let is_live = self
            .buffers
            .get(record.key)
            .is_some_and(|entry| entry.buffer == record.buffer);
        if !is_live {
            log::warn!("free_buffer: buffer {:?} (id {}) is not live", record.buffer, record.id());
            return false;
        }

        if let Some(entry) = self.buffers.remove(record.key) {
            Self::release_buffer(&mut self.backend, entry);
        }
        true
    }

    /// Destroy an image and remove it from the live set
    ///
    /// Same not-live contract as [`ResourcePool::free_buffer`].
    pub fn free_image(&mut self, record: &ImageAllocation) -> bool {
        let is_live = self
            .images
            .get(record.key)
            .is_some_and(|entry| entry.image == record.image);
        if !is_live {
            log::warn!("free_image: image {:?} (id {}) is not live", record.image, record.id());
            return false;
        }

        if let Some(entry) = self.images.remove(record.key) {
            Self::release_image(&mut self.backend, entry);
        }
        true
    }

    /// Copy `data` into a mapped buffer at `offset`
    pub fn write_buffer(&mut self, record: &BufferAllocation, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let entry = self.live_buffer(record)?;
        let ptr = entry
            .mapped
            .ok_or_else(|| VulkanError::invalid("Buffer is not host visible"))?;
        let offset = Self::checked_range(entry.size, offset, data.len())?;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().add(offset), data.len());
        }
        Ok(())
    }

    /// Read `len` bytes back from a mapped buffer at `offset`
    pub fn read_buffer(&self, record: &BufferAllocation, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        let entry = self.live_buffer(record)?;
        let ptr = entry
            .mapped
            .ok_or_else(|| VulkanError::invalid("Buffer is not host visible"))?;
        let offset = Self::checked_range(entry.size, offset, len)?;

        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Whether `record` is still in the live set
    pub fn contains_buffer(&self, record: &BufferAllocation) -> bool {
        self.live_buffer(record).is_ok()
    }

    /// Whether `record` is still in the live set
    pub fn contains_image(&self, record: &ImageAllocation) -> bool {
        self.images
            .get(record.key)
            .is_some_and(|entry| entry.image == record.image)
    }

    /// Number of live buffers
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live images
    pub fn live_image_count(&self) -> usize {
        self.images.len()
    }

    /// Number of live buffers and images
    pub fn live_allocation_count(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    /// Allocation count as reported by the native allocator
    pub fn backend_allocation_count(&self) -> usize {
        self.backend.active_allocations()
    }

    #[cfg(test)]
    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Free every remaining allocation and release the native allocator
    ///
    /// Consumes the pool, so nothing can be allocated or freed afterwards.
    pub fn teardown(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        let leaked = self.live_allocation_count();
        if leaked > 0 {
            log::warn!(
                "Releasing {} buffer(s) and {} image(s) still live at pool teardown",
                self.buffers.len(),
                self.images.len()
            );
        }

        for (_, entry) in self.buffers.drain() {
            Self::release_buffer(&mut self.backend, entry);
        }
        for (_, entry) in self.images.drain() {
            Self::release_image(&mut self.backend, entry);
        }
    }

    fn live_buffer(&self, record: &BufferAllocation) -> VulkanResult<&BufferEntry<B::Allocation>> {
        self.buffers
            .get(record.key)
            .filter(|entry| entry.buffer == record.buffer)
            .ok_or(VulkanError::ResourceNotFound { id: record.id() })
    }

    fn checked_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> VulkanResult<usize> {
        let in_range = offset
            .checked_add(len as vk::DeviceSize)
            .is_some_and(|end| end <= size);
        if !in_range {
            return Err(VulkanError::invalid(format!(
                "Range {offset}+{len} exceeds buffer size {size}"
            )));
        }
        usize::try_from(offset).map_err(|_| VulkanError::invalid("Offset does not fit in host memory"))
    }

    fn release_buffer(backend: &mut B, mut entry: BufferEntry<B::Allocation>) {
        if entry.mapped.is_some() {
            backend.unmap(&mut entry.allocation);
        }
        log::debug!("Freeing buffer {:?} ({} bytes)", entry.buffer, entry.size);
        backend.destroy_buffer(entry.buffer, entry.allocation);
    }

    fn release_image(backend: &mut B, entry: ImageEntry<B::Allocation>) {
        log::debug!("Freeing image {:?}", entry.image);
        backend.destroy_image(entry.image, entry.allocation);
    }
}

impl<B: MemoryBackend> Drop for ResourcePool<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// [`MemoryBackend`] on top of `vk-mem`
pub struct VmaBackend {
    allocator: vk_mem::Allocator,
    active: usize,
}

impl VmaBackend {
    /// Create a VMA allocator for the context's device
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let create_info = vk_mem::AllocatorCreateInfo::new(
            context.instance(),
            context.device(),
            context.physical_device(),
        )
        .vulkan_api_version(vk::API_VERSION_1_1);

        let allocator = vk_mem::Allocator::new(create_info).map_err(VulkanError::api("vmaCreateAllocator"))?;
        log::debug!("VMA allocator created");
        Ok(Self { allocator, active: 0 })
    }

    fn allocation_info(policy: MemoryPolicy) -> vk_mem::AllocationCreateInfo {
        let host_coherent = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        match policy {
            MemoryPolicy::GpuOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            MemoryPolicy::GpuOnlyDedicated => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                flags: vk_mem::AllocationCreateFlags::DEDICATED_MEMORY,
                ..Default::default()
            },
            MemoryPolicy::CpuToGpu => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                required_flags: host_coherent,
                ..Default::default()
            },
            MemoryPolicy::CpuOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                required_flags: host_coherent,
                ..Default::default()
            },
        }
    }
}

impl MemoryBackend for VmaBackend {
    type Allocation = vk_mem::Allocation;

    fn create_buffer(
        &mut self,
        info: &vk::BufferCreateInfo,
        policy: MemoryPolicy,
    ) -> VulkanResult<(vk::Buffer, Self::Allocation)> {
        let alloc_info = Self::allocation_info(policy);
        let created = unsafe { self.allocator.create_buffer(info, &alloc_info) }
            .map_err(VulkanError::allocation("vmaCreateBuffer", info.size))?;
        self.active += 1;
        Ok(created)
    }

    fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo,
        policy: MemoryPolicy,
    ) -> VulkanResult<(vk::Image, Self::Allocation)> {
        let alloc_info = Self::allocation_info(policy);
        let requested = u64::from(info.extent.width) * u64::from(info.extent.height) * u64::from(info.extent.depth);
        let created = unsafe { self.allocator.create_image(info, &alloc_info) }
            .map_err(VulkanError::allocation("vmaCreateImage", requested))?;
        self.active += 1;
        Ok(created)
    }

    fn map(&mut self, allocation: &mut Self::Allocation) -> VulkanResult<*mut u8> {
        unsafe { self.allocator.map_memory(allocation) }.map_err(VulkanError::api("vmaMapMemory"))
    }

    fn unmap(&mut self, allocation: &mut Self::Allocation) {
        unsafe { self.allocator.unmap_memory(allocation) };
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer, mut allocation: Self::Allocation) {
        unsafe { self.allocator.destroy_buffer(buffer, &mut allocation) };
        self.active = self.active.saturating_sub(1);
    }

    fn destroy_image(&mut self, image: vk::Image, mut allocation: Self::Allocation) {
        unsafe { self.allocator.destroy_image(image, &mut allocation) };
        self.active = self.active.saturating_sub(1);
    }

    fn active_allocations(&self) -> usize {
        self.active
    }
}

/// In-memory backend for exercising pool bookkeeping without a device
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use ash::vk::Handle;
    use std::cell::Cell;

    pub struct MockAllocation {
        pub memory: Vec<u8>,
        pub mapped: bool,
    }

    #[derive(Default)]
    pub struct MockBackend {
        next_handle: u64,
        pub active: Rc<Cell<usize>>,
        pub fail_next: Option<vk::Result>,
        pub destroyed_buffers: Vec<vk::Buffer>,
        pub destroyed_images: Vec<vk::Image>,
    }

    impl MockBackend {
        fn next(&mut self) -> VulkanResult<u64> {
            if let Some(code) = self.fail_next.take() {
                return Err(VulkanError::allocation("mockCreate", 0)(code));
            }
            self.next_handle += 1;
            self.active.set(self.active.get() + 1);
            Ok(self.next_handle)
        }
    }

    impl MemoryBackend for MockBackend {
        type Allocation = MockAllocation;

        fn create_buffer(
            &mut self,
            info: &vk::BufferCreateInfo,
            _policy: MemoryPolicy,
        ) -> VulkanResult<(vk::Buffer, MockAllocation)> {
            let raw = self.next()?;
            let memory = vec![0; info.size as usize];
            Ok((vk::Buffer::from_raw(raw), MockAllocation { memory, mapped: false }))
        }

        fn create_image(
            &mut self,
            _info: &vk::ImageCreateInfo,
            _policy: MemoryPolicy,
        ) -> VulkanResult<(vk::Image, MockAllocation)> {
            let raw = self.next()?;
            Ok((vk::Image::from_raw(raw), MockAllocation { memory: Vec::new(), mapped: false }))
        }

        fn map(&mut self, allocation: &mut MockAllocation) -> VulkanResult<*mut u8> {
            allocation.mapped = true;
            Ok(allocation.memory.as_mut_ptr())
        }

        fn unmap(&mut self, allocation: &mut MockAllocation) {
            assert!(allocation.mapped, "unmap without map");
            allocation.mapped = false;
        }

        fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: MockAllocation) {
            assert!(!allocation.mapped, "buffer destroyed while mapped");
            self.destroyed_buffers.push(buffer);
            self.active.set(self.active.get() - 1);
        }

        fn destroy_image(&mut self, image: vk::Image, _allocation: MockAllocation) {
            self.destroyed_images.push(image);
            self.active.set(self.active.get() - 1);
        }

        fn active_allocations(&self) -> usize {
            self.active.get()
        }
    }
}
