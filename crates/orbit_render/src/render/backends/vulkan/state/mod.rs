// Vulkan state management

pub mod frame_resources;
pub mod framebuffer;
pub mod swapchain;
pub mod sync;

pub use frame_resources::*;
pub use framebuffer::*;
pub use swapchain::*;
pub use sync::*;
