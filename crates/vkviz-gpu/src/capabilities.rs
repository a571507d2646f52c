//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    // Vulkan 1.3 core features
    /// Dynamic rendering support (VK 1.3 core)
    pub supports_dynamic_rendering: bool,
    /// Synchronization2 support (VK 1.3 core)
    pub supports_synchronization2: bool,
    /// Timeline semaphore support (VK 1.2 core)
    pub supports_timeline_semaphore: bool,

    // Buffer and descriptor features
    /// Buffer device address support
    pub supports_buffer_device_address: bool,

    // Memory info
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Maximum memory allocation count
    pub max_memory_allocation_count: u32,

    // Compute limits
    /// Maximum compute workgroup size
    pub max_compute_workgroup_size: [u32; 3],
    /// Maximum compute workgroup invocations
    pub max_compute_workgroup_invocations: u32,

    // Image limits
    /// Maximum 2D image dimension, bounds offscreen target size
    pub max_image_dimension_2d: u32,

    // Available extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        // Get basic properties
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        // Get available extensions
        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        // Parse device info
        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        // Calculate device-local memory
        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        // Features used here are core in 1.2/1.3, so the API version decides.
        let api_version = properties.api_version;
        let has_vulkan_1_2 = api_at_least(api_version, 1, 2);
        let has_vulkan_1_3 = api_at_least(api_version, 1, 3);

        Self {
            vendor,
            device_name,
            api_version,
            driver_version: properties.driver_version,

            supports_dynamic_rendering: has_vulkan_1_3,
            supports_synchronization2: has_vulkan_1_3,
            supports_timeline_semaphore: has_vulkan_1_2
                || available_extensions.contains("VK_KHR_timeline_semaphore"),

            supports_buffer_device_address: has_vulkan_1_2
                || available_extensions.contains("VK_KHR_buffer_device_address"),

            device_local_memory_mb,
            max_memory_allocation_count: properties.limits.max_memory_allocation_count,

            max_compute_workgroup_size: properties.limits.max_compute_work_group_size,
            max_compute_workgroup_invocations: properties.limits.max_compute_work_group_invocations,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,

            available_extensions,
        }
    }

    /// Check if the GPU can run the frame loop: Vulkan 1.3 with
    /// dynamic rendering, synchronization2, and timeline semaphores.
    pub fn meets_requirements(&self) -> bool {
        api_at_least(self.api_version, 1, 3)
            && self.supports_dynamic_rendering
            && self.supports_synchronization2
            && self.supports_timeline_semaphore
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

fn api_at_least(api_version: u32, major: u32, minor: u32) -> bool {
    let actual = (
        vk::api_version_major(api_version),
        vk::api_version_minor(api_version),
    );
    actual >= (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn api_version_comparison_spans_majors() {
        assert!(api_at_least(vk::make_api_version(0, 1, 3, 0), 1, 3));
        assert!(api_at_least(vk::make_api_version(0, 2, 0, 0), 1, 3));
        assert!(!api_at_least(vk::make_api_version(0, 1, 2, 198), 1, 3));
    }

    fn caps(api_version: u32, timeline: bool) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: "test".to_string(),
            api_version,
            driver_version: 0,
            supports_dynamic_rendering: true,
            supports_synchronization2: true,
            supports_timeline_semaphore: timeline,
            supports_buffer_device_address: true,
            device_local_memory_mb: 256,
            max_memory_allocation_count: 4096,
            max_compute_workgroup_size: [1024, 1024, 64],
            max_compute_workgroup_invocations: 1024,
            max_image_dimension_2d: 16384,
            available_extensions: HashSet::new(),
        }
    }

    #[test]
    fn requirements_need_vulkan_1_3_and_timeline() {
        assert!(caps(vk::API_VERSION_1_3, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_2, true).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_3, false).meets_requirements());
    }
}
