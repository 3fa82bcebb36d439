//! Vulkan swapchain management
//!
//! The swapchain owns the surface, its images and views, and the two
//! semaphores every frame synchronizes on. Its lifetime is a small state
//! machine:
//!
//! ```text
//! Uninitialized --create--> Created --recreate--> Recreating --> Created
//!        \                      |                    |  ^
//!         \                     |                    +--+ failed build, retry
//!          +------destroy-------+-------------------------> Destroyed
//! ```
//!
//! Any other transition fails with [`VulkanError::InvalidOperation`]. On
//! recreate the surface and semaphores are kept; only the swapchain and its
//! views are rebuilt. A failed rebuild leaves the swapchain in Recreating
//! with no images, where acquire and present report it out of date.

use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::window::{FramebufferSource, Window};
use crate::render::backends::vulkan::state::sync::Semaphore;
use crate::render::backends::vulkan::{QueueFamilyIndices, VulkanContext, VulkanError, VulkanResult};

/// Number of images requested before clamping to the surface limits
pub const PREFERRED_IMAGE_COUNT: u32 = 3;

/// Lifecycle state of a [`Swapchain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    /// Constructed, no surface yet
    Uninitialized,
    /// Surface, swapchain, views and semaphores exist
    Created,
    /// Old swapchain torn down, new one being built
    Recreating,
    /// Everything released
    Destroyed,
}

impl SwapchainState {
    fn require(self, required: Self, operation: &str) -> VulkanResult<()> {
        if self == required {
            Ok(())
        } else {
            Err(VulkanError::invalid(format!(
                "Swapchain {operation} requires state {required:?}, current state is {self:?}"
            )))
        }
    }

    /// `recreate` is accepted from Created, and again from Recreating after a
    /// failed build
    fn require_recreatable(self) -> VulkanResult<()> {
        match self {
            Self::Created | Self::Recreating => Ok(()),
            _ => self.require(Self::Created, "recreate"),
        }
    }

    /// Acquire and present need a built swapchain; a pending recreate is
    /// reported as out of date so the caller runs the resize path again
    fn require_presentable(self, operation: &str) -> VulkanResult<()> {
        match self {
            Self::Created => Ok(()),
            Self::Recreating => Err(VulkanError::SwapchainOutOfDate),
            _ => self.require(Self::Created, operation),
        }
    }
}

/// Swapchain with its surface and frame semaphores
pub struct Swapchain {
    state: SwapchainState,
    image_available: Option<Semaphore>,
    render_finished: Option<Semaphore>,
    image_views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    needs_recreation: bool,
    queue_families: QueueFamilyIndices,
    physical_device: vk::PhysicalDevice,
    instance: vk::Instance,
    swapchain_loader: SwapchainLoader,
    surface_loader: SurfaceLoader,
    device: Device,
}

impl Swapchain {
    /// Bind to `context` without creating anything yet
    pub fn new(context: &VulkanContext) -> Self {
        Self {
            state: SwapchainState::Uninitialized,
            image_available: None,
            render_finished: None,
            image_views: Vec::new(),
            images: Vec::new(),
            swapchain: vk::SwapchainKHR::null(),
            surface: vk::SurfaceKHR::null(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            needs_recreation: false,
            queue_families: context.queue_families(),
            physical_device: context.physical_device(),
            instance: context.instance().handle(),
            swapchain_loader: context.swapchain_loader().clone(),
            surface_loader: context.surface_loader().clone(),
            device: context.device().clone(),
        }
    }

    /// Create the surface, swapchain, views and semaphores
    pub fn create(&mut self, window: &Window, width: u32, height: u32) -> VulkanResult<()> {
        self.state.require(SwapchainState::Uninitialized, "create")?;
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!("Cannot create a {width}x{height} swapchain")));
        }

        self.surface = window.create_vulkan_surface(self.instance)?;
        if let Err(e) = self.create_on_surface(width, height) {
            self.release_partial();
            return Err(e);
        }
        self.state = SwapchainState::Created;

        log::info!(
            "Swapchain created: {} images, {}x{}, {:?}",
            self.images.len(),
            self.extent.width,
            self.extent.height,
            self.format.format
        );
        Ok(())
    }

    fn create_on_surface(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                self.physical_device,
                self.queue_families.present,
                self.surface,
            )
        }
        .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceSupportKHR"))?;
        if !supported {
            return Err(VulkanError::InitializationFailed(
                "Present queue family cannot present to the window surface".to_string(),
            ));
        }

        self.image_available = Some(Semaphore::new(self.device.clone())?);
        self.render_finished = Some(Semaphore::new(self.device.clone())?);

        self.build(width, height, vk::SwapchainKHR::null())
    }

    /// Undo a failed `create`, leaving the swapchain Uninitialized
    fn release_partial(&mut self) {
        self.image_available = None;
        self.render_finished = None;
        self.destroy_image_views();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
        self.surface = vk::SurfaceKHR::null();
        self.images.clear();
    }

    /// Rebuild the swapchain and views for a new framebuffer size
    ///
    /// The caller has already destroyed everything referencing the old views
    /// and waited for the device to go idle. A zero size is rejected without
    /// touching the swapchain.
    pub fn recreate(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!("Cannot recreate a {width}x{height} swapchain")));
        }
        self.state.require_recreatable()?;
        self.state = SwapchainState::Recreating;

        self.destroy_image_views();
        self.images.clear();
        let old_swapchain = std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null());

        let built = self.build(width, height, old_swapchain);
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }
        if let Err(e) = built {
            // Stay in Recreating with no swapchain; the next recreate starts fresh
            self.destroy_image_views();
            self.images.clear();
            if self.swapchain != vk::SwapchainKHR::null() {
                unsafe {
                    self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                }
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.needs_recreation = true;
            log::warn!("Swapchain recreation at {}x{} failed: {}", width, height, e);
            return Err(e);
        }

        self.needs_recreation = false;
        self.state = SwapchainState::Created;
        log::info!("Swapchain recreated at {}x{}", self.extent.width, self.extent.height);
        Ok(())
    }

    fn build(&mut self, width: u32, height: u32, old_swapchain: vk::SwapchainKHR) -> VulkanResult<()> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                    .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?,
                self.surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.surface)
                    .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceFormatsKHR"))?,
                self.surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)
                    .map_err(VulkanError::api("vkGetPhysicalDeviceSurfacePresentModesKHR"))?,
            )
        };

        let format = choose_format(&formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, width, height);
        // Minimized between the size poll and this query
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::SwapchainOutOfDate);
        }
        let image_count = choose_image_count(&capabilities);

        let family_indices = [self.queue_families.graphics, self.queue_families.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        create_info = if family_indices[0] == family_indices[1] {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(VulkanError::api("vkCreateSwapchainKHR"))?;
        self.swapchain = swapchain;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(VulkanError::api("vkGetSwapchainImagesKHR"))?;

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            // Views created so far are released by destroy on error
            let view = unsafe { self.device.create_image_view(&view_info, None) }
                .map_err(VulkanError::api("vkCreateImageView"))?;
            self.image_views.push(view);
        }

        log::debug!("Present mode {:?}, {} images requested", present_mode, image_count);
        self.format = format;
        self.extent = extent;
        Ok(())
    }

    /// Acquire the next image, signaling the image-available semaphore
    ///
    /// Out-of-date surfaces fail with [`VulkanError::SwapchainOutOfDate`]. A
    /// suboptimal image is returned normally and flags the swapchain for
    /// recreation.
    pub fn acquire_next_image(&mut self) -> VulkanResult<u32> {
        self.state.require_presentable("acquire")?;

        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available_semaphore(),
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Acquired suboptimal swapchain image {}", index);
                    self.needs_recreation = true;
                }
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(VulkanError::SwapchainOutOfDate),
            Err(code) => Err(VulkanError::api("vkAcquireNextImageKHR")(code)),
        }
    }

    /// Present `image_index` on `queue` after the render-finished semaphore
    ///
    /// Out-of-date and suboptimal results, or an earlier suboptimal acquire,
    /// fail with [`VulkanError::SwapchainOutOfDate`].
    pub fn present(&mut self, queue: vk::Queue, image_index: u32) -> VulkanResult<()> {
        self.state.require_presentable("present")?;

        let wait_semaphores = [self.render_finished_semaphore()];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) if !self.needs_recreation => Ok(()),
            Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_recreation = true;
                Err(VulkanError::SwapchainOutOfDate)
            }
            Err(code) => Err(VulkanError::api("vkQueuePresentKHR")(code)),
        }
    }

    /// Wait for the device, then release semaphores, views, swapchain and surface
    ///
    /// Idempotent; also runs on drop.
    pub fn destroy(&mut self) {
        if matches!(self.state, SwapchainState::Uninitialized | SwapchainState::Destroyed)
            && self.surface == vk::SurfaceKHR::null()
        {
            self.state = SwapchainState::Destroyed;
            return;
        }

        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::error!("Device wait failed before swapchain teardown: {:?}", e);
        }

        self.image_available = None;
        self.render_finished = None;
        self.destroy_image_views();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }
        }
        self.images.clear();
        self.state = SwapchainState::Destroyed;
        log::debug!("Swapchain destroyed");
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe {
                self.device.destroy_image_view(view, None);
            }
        }
    }

    /// Current lifecycle state
    pub const fn state(&self) -> SwapchainState {
        self.state
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// View of image `index`, `None` when out of range
    pub fn image_view(&self, index: usize) -> Option<vk::ImageView> {
        self.image_views.get(index).copied()
    }

    /// All image views in image order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Current extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Negotiated surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Whether an acquire or present reported a stale swapchain
    pub const fn needs_recreation(&self) -> bool {
        self.needs_recreation
    }

    /// Semaphore signaled when an acquired image is ready
    pub fn image_available_semaphore(&self) -> vk::Semaphore {
        self.image_available.as_ref().map_or_else(vk::Semaphore::null, Semaphore::handle)
    }

    /// Semaphore signaled when rendering to the acquired image is done
    pub fn render_finished_semaphore(&self) -> vk::Semaphore {
        self.render_finished.as_ref().map_or_else(vk::Semaphore::null, Semaphore::handle)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Prefer B8G8R8A8_SRGB with SRGB_NONLINEAR, else the first reported format
pub fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when available, else FIFO which every device supports
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the requested size clamped when the surface leaves it to us
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        }
    } else {
        capabilities.current_extent
    }
}

/// Three images, clamped to the surface limits (`max_image_count == 0` means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = PREFERRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Block until `source` reports a non-zero framebuffer size
///
/// Alternates size queries with event waits, so a minimized window parks the
/// caller here until it is restored.
pub fn wait_for_nonzero_framebuffer<S: FramebufferSource>(source: &mut S) -> (u32, u32) {
    loop {
        let (width, height) = source.framebuffer_size();
        if width > 0 && height > 0 {
            return (width, height);
        }
        source.wait_events();
    }
}

/// Wait for a visible framebuffer and run `rebuild` at its size
///
/// A transient failure from `rebuild` (the window was minimized again before
/// the surface was queried) waits for window events and polls again.
pub fn rebuild_when_visible<S, F>(source: &mut S, mut rebuild: F) -> VulkanResult<(u32, u32)>
where
    S: FramebufferSource,
    F: FnMut(u32, u32) -> VulkanResult<()>,
{
    loop {
        let (width, height) = wait_for_nonzero_framebuffer(source);
        match rebuild(width, height) {
            Ok(()) => return Ok((width, height)),
            Err(e) if e.is_transient() => {
                log::debug!("Surface went stale at {}x{}, polling again", width, height);
                source.wait_events();
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    struct SizeSequence {
        sizes: Vec<(u32, u32)>,
        waits: usize,
    }

    impl FramebufferSource for SizeSequence {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes[self.waits.min(self.sizes.len() - 1)]
        }

        fn wait_events(&mut self) {
            self.waits += 1;
        }
    }

    #[test]
    fn test_format_prefers_srgb_bgra() {
        let linear = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(choose_format(&[linear, srgb]), Some(srgb));
        assert_eq!(choose_format(&[linear]), Some(linear));
        assert_eq!(choose_format(&[]), None);
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_current_extent() {
        let caps = capabilities((1024, 768), 2, 8);
        assert_eq!(choose_extent(&caps, 800, 600), vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_extent_clamps_requested_size_for_sentinel() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 8);
        assert_eq!(choose_extent(&caps, 800, 600), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(choose_extent(&caps, 9000, 9000), vk::Extent2D { width: 4096, height: 2048 });
        assert_eq!(choose_extent(&caps, 0, 0), vk::Extent2D { width: 1, height: 1 });
    }

    #[test]
    fn test_image_count_clamped_to_limits() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 1, 2)), 2);
        assert_eq!(choose_image_count(&capabilities((1, 1), 4, 0)), 4);
    }

    #[test]
    fn test_state_requirements() {
        assert!(SwapchainState::Uninitialized
            .require(SwapchainState::Uninitialized, "create")
            .is_ok());
        assert!(matches!(
            SwapchainState::Destroyed.require(SwapchainState::Created, "recreate"),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(SwapchainState::Created
            .require(SwapchainState::Uninitialized, "create")
            .is_err());
        assert!(SwapchainState::Recreating
            .require(SwapchainState::Created, "acquire")
            .is_err());
    }

    #[test]
    fn test_failed_rebuild_can_be_retried() {
        assert!(SwapchainState::Recreating.require_recreatable().is_ok());
        assert!(SwapchainState::Created.require_recreatable().is_ok());
        assert!(matches!(
            SwapchainState::Uninitialized.require_recreatable(),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(SwapchainState::Destroyed.require_recreatable().is_err());
    }

    #[test]
    fn test_pending_rebuild_reads_as_out_of_date() {
        assert!(SwapchainState::Created.require_presentable("acquire").is_ok());

        let pending = SwapchainState::Recreating.require_presentable("present").unwrap_err();
        assert!(matches!(pending, VulkanError::SwapchainOutOfDate));
        assert!(pending.is_transient());

        let destroyed = SwapchainState::Destroyed.require_presentable("acquire").unwrap_err();
        assert!(!destroyed.is_transient());
    }

    #[test]
    fn test_rebuild_retries_after_minimize_race() {
        let mut source = SizeSequence {
            sizes: vec![(800, 600), (0, 0), (1024, 768)],
            waits: 0,
        };
        let mut state = SwapchainState::Created;
        let mut attempts = Vec::new();

        // First attempt sees a zero surface extent and fails mid-rebuild
        let size = rebuild_when_visible(&mut source, |width, height| {
            state.require_recreatable()?;
            state = SwapchainState::Recreating;
            attempts.push((width, height));
            if attempts.len() == 1 {
                return Err(VulkanError::SwapchainOutOfDate);
            }
            state = SwapchainState::Created;
            Ok(())
        })
        .unwrap();

        assert_eq!(size, (1024, 768));
        assert_eq!(attempts, vec![(800, 600), (1024, 768)]);
        assert_eq!(state, SwapchainState::Created);
        assert_eq!(source.waits, 2);
    }

    #[test]
    fn test_rebuild_stops_on_fatal_error() {
        let mut source = SizeSequence {
            sizes: vec![(800, 600)],
            waits: 0,
        };
        let mut attempts = 0;

        let result = rebuild_when_visible(&mut source, |_, _| {
            attempts += 1;
            Err(VulkanError::api("vkCreateSwapchainKHR")(vk::Result::ERROR_DEVICE_LOST))
        });

        assert!(matches!(result, Err(VulkanError::Api { .. })));
        assert_eq!(attempts, 1);
        assert_eq!(source.waits, 0);
    }

    #[test]
    fn test_resize_poll_waits_until_nonzero() {
        let mut source = SizeSequence {
            sizes: vec![(0, 0), (0, 0), (640, 0), (640, 480)],
            waits: 0,
        };

        assert_eq!(wait_for_nonzero_framebuffer(&mut source), (640, 480));
        assert_eq!(source.waits, 3);
    }

    #[test]
    fn test_resize_poll_returns_immediately_when_visible() {
        let mut source = SizeSequence {
            sizes: vec![(800, 600)],
            waits: 0,
        };

        assert_eq!(wait_for_nonzero_framebuffer(&mut source), (800, 600));
        assert_eq!(source.waits, 0);
    }
}
