//! Vulkan context management
//!
//! Owns the instance, the validation messenger, the selected physical device and
//! the logical device with its queues. Every other component borrows the context
//! and must be dropped before it.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use super::window::{Window, WindowError};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A native Vulkan call failed
    #[error("Vulkan call {call} failed: {code:?}")]
    Api {
        /// Name of the failing entry point
        call: &'static str,
        /// Result code reported by the driver
        code: vk::Result,
    },

    /// Image layout transition outside the supported table
    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        /// Layout the image is currently in
        old: vk::ImageLayout,
        /// Layout that was requested
        new: vk::ImageLayout,
    },

    /// Swapchain no longer matches the surface and must be recreated
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// Resource with specified ID could not be found
    #[error("Resource not found: {id}")]
    ResourceNotFound {
        /// The unique identifier of the resource
        id: u64,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Memory allocation failed
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Windowing layer failure
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl VulkanError {
    /// Error mapper for `map_err` naming the failing call
    pub fn api(call: &'static str) -> impl Fn(vk::Result) -> Self {
        move |code| Self::Api { call, code }
    }

    /// Error mapper for allocation calls, turning memory exhaustion into
    /// [`VulkanError::OutOfMemory`]
    pub fn allocation(call: &'static str, requested: vk::DeviceSize) -> impl Fn(vk::Result) -> Self {
        move |code| match code {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                Self::OutOfMemory { requested }
            }
            code => Self::Api { call, code },
        }
    }

    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }

    /// Whether the error is a retryable swapchain condition rather than a fatal one
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::SwapchainOutOfDate => true,
            Self::Api { code, .. } => {
                matches!(*code, vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR)
            }
            _ => false,
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, optionally with validation and a debug messenger
    ///
    /// Validation is skipped with a warning if the Khronos layer is
    /// not installed.
    pub fn new(window: &Window, app_name: &str, version: (u32, u32, u32), enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Application name contains a NUL byte".to_string()))?;
        let engine_name_cstr = CString::new("OrbitRender").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, version.0, version.1, version.2))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let required_extensions = window.get_required_instance_extensions()?;
        let cstr_extensions = required_extensions
            .into_iter()
            .map(|ext| {
                CString::new(ext).map_err(|_| VulkanError::InitializationFailed("Bad extension name".to_string()))
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let validation = enable_validation && Self::validation_layer_available(&entry)?;
        if enable_validation && !validation {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let mut layer_names: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layer_names.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VulkanError::api("vkCreateInstance"))?;

        let debug_utils = if validation {
            let loader = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!("Vulkan instance created (validation: {validation})");
        Ok(Self { entry, instance, debug_utils })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .map_err(VulkanError::api("vkEnumerateInstanceLayerProperties"))?;
        Ok(layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER))
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(VulkanError::api("vkCreateDebugUtilsMessengerEXT"))
    }

    /// Vulkan entry point
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Vulkan instance handle
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Queue family assignment, resolved once per physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for draw and transfer submissions
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
    /// Family with compute capability
    pub compute: u32,
}

impl QueueFamilyIndices {
    /// Resolve the three queue families from the reported properties
    ///
    /// Each family must carry the capability it is assigned. Presentation
    /// prefers the graphics family so a single queue can serve both.
    pub fn resolve(
        families: &[vk::QueueFamilyProperties],
        supports_present: impl Fn(u32) -> bool,
    ) -> VulkanResult<Self> {
        let with_flag = |flag: vk::QueueFlags| {
            families
                .iter()
                .position(|family| family.queue_count > 0 && family.queue_flags.contains(flag))
                .map(|index| index as u32)
        };

        let graphics = with_flag(vk::QueueFlags::GRAPHICS)
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family found".to_string()))?;
        let compute = with_flag(vk::QueueFlags::COMPUTE)
            .ok_or_else(|| VulkanError::InitializationFailed("No compute queue family found".to_string()))?;

        let present = if supports_present(graphics) {
            Some(graphics)
        } else {
            (0..families.len() as u32).find(|&index| supports_present(index))
        }
        .ok_or_else(|| VulkanError::InitializationFailed("No present queue family found".to_string()))?;

        Ok(Self { graphics, present, compute })
    }

    /// Distinct family indices, in ascending order
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present, self.compute]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Resolved queue families
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Select the best suitable physical device, preferring discrete GPUs
    pub fn select_suitable_device(instance: &Instance, window: &Window) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(VulkanError::api("vkEnumeratePhysicalDevices"))?;

        let best = devices
            .into_iter()
            .filter_map(|device| match Self::evaluate_device(instance, window, device) {
                Ok(info) => Some(info),
                Err(e) => {
                    log::debug!("Skipping physical device {:?}: {}", device, e);
                    None
                }
            })
            .max_by_key(|info| device_type_score(info.properties.device_type))
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;

        log::info!("Selected GPU: {} ({:?})", best.name(), best.properties.device_type);
        Ok(best)
    }

    fn evaluate_device(instance: &Instance, window: &Window, device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_families = QueueFamilyIndices::resolve(&families, |index| {
            window.presentation_support(instance.handle(), device, index)
        })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(VulkanError::api("vkEnumerateDeviceExtensionProperties"))?;
        let has_swapchain = extensions.iter().any(|available| {
            (unsafe { CStr::from_ptr(available.extension_name.as_ptr()) }) == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        Ok(Self { device, properties, features, queue_families })
    }

    /// Human readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Preference order used when several devices are suitable
pub const fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Compute queue
    pub compute_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Whether anisotropic sampling was enabled
    pub anisotropy_enabled: bool,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per distinct family
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let families = physical_device_info.queue_families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let anisotropy_enabled = physical_device_info.features.sampler_anisotropy == vk::TRUE;
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(anisotropy_enabled)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device_info.device, &create_info, None) }
            .map_err(VulkanError::api("vkCreateDevice"))?;

        let (graphics_queue, present_queue, compute_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
                device.get_device_queue(families.compute, 0),
            )
        };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            compute_queue,
            swapchain_loader,
            anisotropy_enabled,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Field order is drop order: the logical device goes before the instance.
pub struct VulkanContext {
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface_loader: SurfaceLoader,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create the instance, pick a GPU and open the logical device
    pub fn new(
        window: &Window,
        app_name: &str,
        version: (u32, u32, u32),
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, version, enable_validation)?;
        let surface_loader = SurfaceLoader::new(instance.entry(), instance.instance());
        let physical_device = PhysicalDeviceInfo::select_suitable_device(instance.instance(), window)?;
        let device = LogicalDevice::new(instance.instance(), &physical_device)?;

        log::info!("Queue families resolved: {:?}", physical_device.queue_families);
        Ok(Self { device, physical_device, surface_loader, instance })
    }

    /// Get a reference to the Vulkan entry
    pub const fn entry(&self) -> &Entry {
        self.instance.entry()
    }

    /// Get a reference to the Vulkan instance
    pub const fn instance(&self) -> &Instance {
        self.instance.instance()
    }

    /// Get the raw device handle
    pub const fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the selected physical device handle
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device.device
    }

    /// Get the physical device info
    pub const fn physical_device_info(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the resolved queue family indices
    pub const fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Get the graphics queue
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub const fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the compute queue
    pub const fn compute_queue(&self) -> vk::Queue {
        self.device.compute_queue
    }

    /// Get the surface loader
    pub const fn surface_loader(&self) -> &SurfaceLoader {
        &self.surface_loader
    }

    /// Get the swapchain loader
    pub const fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Whether samplers may request anisotropic filtering
    pub const fn anisotropy_enabled(&self) -> bool {
        self.device.anisotropy_enabled
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::api("vkDeviceWaitIdle"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_single_universal_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        let indices = QueueFamilyIndices::resolve(&families, |_| true).unwrap();

        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 0, compute: 0 });
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn test_resolve_split_families() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = QueueFamilyIndices::resolve(&families, |index| index == 0).unwrap();

        assert_eq!(indices.graphics, 2);
        assert_eq!(indices.compute, 1);
        assert_eq!(indices.present, 0);
        assert_eq!(indices.unique(), vec![0, 1, 2]);
    }

    #[test]
    fn test_present_prefers_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::resolve(&families, |_| true).unwrap();
        assert_eq!(indices.present, indices.graphics);
    }

    #[test]
    fn test_missing_capability_fails() {
        let families = [family(vk::QueueFlags::TRANSFER)];
        assert!(matches!(
            QueueFamilyIndices::resolve(&families, |_| true),
            Err(VulkanError::InitializationFailed(_))
        ));

        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        assert!(QueueFamilyIndices::resolve(&families, |_| false).is_err());
    }

    #[test]
    fn test_empty_family_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];

        let indices = QueueFamilyIndices::resolve(&families, |_| true).unwrap();
        assert_eq!(indices.graphics, 1);
    }

    #[test]
    fn test_discrete_gpu_ranks_highest() {
        assert!(
            device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(device_type_score(vk::PhysicalDeviceType::CPU) > device_type_score(vk::PhysicalDeviceType::OTHER));
    }

    #[test]
    fn test_transient_classification() {
        assert!(VulkanError::SwapchainOutOfDate.is_transient());
        assert!(VulkanError::api("vkQueuePresentKHR")(vk::Result::ERROR_OUT_OF_DATE_KHR).is_transient());
        assert!(!VulkanError::api("vkCreateDevice")(vk::Result::ERROR_DEVICE_LOST).is_transient());
        assert!(!VulkanError::invalid("nope").is_transient());
    }

    #[test]
    fn test_allocation_mapper_detects_exhaustion() {
        let err = VulkanError::allocation("vmaCreateBuffer", 4096)(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(matches!(err, VulkanError::OutOfMemory { requested: 4096 }));

        let err = VulkanError::allocation("vmaCreateBuffer", 4096)(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert!(matches!(err, VulkanError::Api { call: "vmaCreateBuffer", .. }));
    }
}
