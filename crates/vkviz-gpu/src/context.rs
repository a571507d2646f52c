//! GPU context management.
//!
//! Bootstraps instance, device, queues, allocator, and the descriptor
//! allocator in one step. Presentation resources live elsewhere and borrow
//! the context.

use crate::capabilities::GpuCapabilities;
use crate::descriptors::{DescriptorAllocator, DescriptorAllocatorConfig};
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device, DebugMessenger};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr};
use std::sync::Arc;
use tracing::{info, warn};

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_messenger: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) descriptors: Mutex<DescriptorAllocator>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) compute_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) compute_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the device, for resources that outlive a borrow.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        Arc::clone(&self.device)
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Whether the validation layers and messenger are active.
    pub fn validation_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Get the graphics queue. Also used for presentation.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the compute queue.
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the compute queue family index.
    pub fn compute_queue_family(&self) -> u32 {
        self.compute_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Get access to the global descriptor allocator.
    pub fn descriptors(&self) -> &Mutex<DescriptorAllocator> {
        &self.descriptors
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.descriptors.lock().destroy(&self.device);

            // Frees all VkDeviceMemory, so it must precede device destruction.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    descriptor_config: DescriptorAllocatorConfig,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "vkviz".to_string(),
            enable_validation: cfg!(debug_assertions),
            descriptor_config: DescriptorAllocatorConfig::default(),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Sizing of the global descriptor pool.
    pub fn descriptor_config(mut self, config: DescriptorAllocatorConfig) -> Self {
        self.descriptor_config = config;
        self
    }

    /// Build a context able to present to windows on `display`.
    pub fn build(self, display: RawDisplayHandle) -> Result<GpuContext> {
        self.build_inner(Some(display))
    }

    /// Build a context without presentation support.
    pub fn build_headless(self) -> Result<GpuContext> {
        self.build_inner(None)
    }

    fn build_inner(self, display: Option<RawDisplayHandle>) -> Result<GpuContext> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let (instance, validation) = unsafe {
            create_instance(&entry, &self.app_name, display, self.enable_validation)
        }?;

        // Everything below tears the instance down on failure.
        let result = unsafe { self.create_device_objects(&entry, &instance, validation, display.is_some()) };
        match result {
            Ok(parts) => Ok(GpuContext {
                entry,
                instance,
                debug_messenger: parts.debug_messenger,
                physical_device: parts.physical_device,
                device: parts.device,
                capabilities: parts.capabilities,
                allocator: Mutex::new(parts.allocator),
                descriptors: Mutex::new(parts.descriptors),
                graphics_queue_family: parts.queue_families.graphics,
                compute_queue_family: parts.queue_families.compute,
                graphics_queue: parts.graphics_queue,
                compute_queue: parts.compute_queue,
            }),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    unsafe fn create_device_objects(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
        validation: bool,
        presentation: bool,
    ) -> Result<DeviceObjects> {
        let debug_messenger = if validation {
            match DebugMessenger::new(entry, instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    warn!("Validation messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };
        let destroy_messenger = |messenger: Option<DebugMessenger>| {
            if let Some(messenger) = messenger {
                messenger.destroy();
            }
        };

        let selected = (|| {
            let physical_device = select_physical_device(instance)?;
            let capabilities = GpuCapabilities::query(instance, physical_device);
            if !capabilities.meets_requirements() {
                return Err(GpuError::NoSuitableDevice);
            }
            info!("Selected GPU: {}", capabilities.summary());
            let queue_families = find_queue_families(instance, physical_device)?;
            Ok((physical_device, capabilities, queue_families))
        })();
        let (physical_device, capabilities, queue_families) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };

        let (device, graphics_queue, compute_queue) =
            match create_device(instance, physical_device, &queue_families, presentation) {
                Ok(created) => created,
                Err(e) => {
                    destroy_messenger(debug_messenger);
                    return Err(e);
                }
            };
        let device = Arc::new(device);

        let allocator = match GpuAllocator::new(instance, Arc::clone(&device), physical_device) {
            Ok(allocator) => allocator,
            Err(e) => {
                device.destroy_device(None);
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };

        let descriptors = match DescriptorAllocator::new(&device, &self.descriptor_config) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                drop(allocator);
                device.destroy_device(None);
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };

        Ok(DeviceObjects {
            debug_messenger,
            physical_device,
            device,
            capabilities,
            allocator,
            descriptors,
            queue_families,
            graphics_queue,
            compute_queue,
        })
    }
}

struct DeviceObjects {
    debug_messenger: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: GpuAllocator,
    descriptors: DescriptorAllocator,
    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
}

/// Queue family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueFamilyIndices {
    graphics: u32,
    compute: u32,
}

/// Pick queue families from their flags: the first graphics family, and a
/// dedicated compute family when one exists.
pub(crate) fn pick_queue_families(families: &[vk::QueueFlags]) -> Option<QueueFamilyIndices> {
    let mut graphics = None;
    let mut compute = None;

    for (i, flags) in families.iter().enumerate() {
        let i = u32::try_from(i).ok()?;

        if flags.contains(vk::QueueFlags::COMPUTE)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && compute.is_none()
        {
            compute = Some(i);
        }

        if flags.contains(vk::QueueFlags::GRAPHICS) && graphics.is_none() {
            graphics = Some(i);
        }
    }

    let graphics = graphics?;
    Some(QueueFamilyIndices {
        graphics,
        compute: compute.unwrap_or(graphics),
    })
}

/// Find queue families for graphics and compute.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilyIndices> {
    let flags: Vec<vk::QueueFlags> = instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .map(|family| family.queue_flags)
        .collect();

    pick_queue_families(&flags).ok_or(GpuError::NoSuitableDevice)
}

/// Device extensions, with the swapchain only when presenting.
fn required_device_extensions(presentation: bool) -> Vec<&'static CStr> {
    let mut extensions = Vec::new();
    if presentation {
        extensions.push(ash::khr::swapchain::NAME);
    }
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_subset::NAME);
    extensions
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
    presentation: bool,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let mut unique_families = vec![queue_families.graphics];
    if queue_families.compute != queue_families.graphics {
        unique_families.push(queue_families.compute);
    }

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions = required_device_extensions(presentation);
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default()
        .timeline_semaphore(true)
        .separate_depth_stencil_layouts(true)
        .buffer_device_address(true)
        .descriptor_indexing(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
    let compute_queue = device.get_device_queue(queue_families.compute, 0);

    Ok((device, graphics_queue, compute_queue))
}
