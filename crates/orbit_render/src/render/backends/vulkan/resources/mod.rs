//! Vulkan resource management
//!
//! Every GPU allocation goes through the pool in [`allocator`]; the other
//! modules build typed resources on top of it.

/// Buffer and image pool
pub mod allocator;

/// One-shot uploads and image layout transitions
pub mod staging;

/// Per-image uniform buffers
pub mod uniform_buffer;

/// Sampled textures
pub mod texture;

/// Descriptor set management
pub mod descriptor_set;

/// Meshes packed into shared vertex and index buffers
pub mod model;
