//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules.
//! Components are listed leaves first: context, allocator, staging engine,
//! swapchain, frame resources.

/// Vulkan initialization types (context, window)
pub mod initialization;

/// Vulkan resource management (allocator, staging, textures, descriptors, models)
pub mod resources;

/// Vulkan rendering operations (commands, render pass, shaders, vertex layout)
pub mod rendering;

/// Vulkan state management (swapchain, framebuffers, sync, frame resources)
pub mod state;

// Re-export core initialization types
pub use initialization::context::{PhysicalDeviceInfo, QueueFamilyIndices, VulkanContext, VulkanError, VulkanResult};
pub use initialization::window::{FramebufferSource, Window, WindowError};

// Re-export resource types
pub use resources::allocator::{BufferAllocation, GpuAllocator, ImageAllocation, MemoryBackend, MemoryPolicy, ResourcePool};
pub use resources::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use resources::model::{Model, Primitive};
pub use resources::staging::{LayoutTransition, StagingEngine};
pub use resources::texture::Texture;
pub use resources::uniform_buffer::{UniformBufferObject, UniformBuffers};

// Re-export rendering types
pub use rendering::commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use rendering::render_pass::RenderPass;
pub use rendering::shader::{GraphicsPipeline, ShaderModule};

// Re-export state types
pub use state::frame_resources::FrameResources;
pub use state::framebuffer::Framebuffers;
pub use state::swapchain::{Swapchain, SwapchainState};
pub use state::sync::{Fence, Semaphore};
