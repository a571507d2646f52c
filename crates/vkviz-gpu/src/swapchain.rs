//! Swapchain (presentable image chain) management.
//!
//! The chain is always built with a fixed format preference and FIFO
//! presentation, and is rebuilt whole rather than patched when the surface
//! changes.

use crate::error::{GpuError, Result};
use crate::image::create_view_2d;
use ash::vk;
use tracing::{debug, info};

/// Preferred presentable format.
pub const DESIRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Result of acquiring a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; the image-acquired semaphore will be signaled.
    Acquired(u32),
    /// Image acquired but the chain no longer matches the surface. The
    /// semaphore will still be signaled.
    Suboptimal(u32),
    /// No image acquired; the chain must be rebuilt.
    OutOfDate,
}

impl AcquireOutcome {
    /// Whether the chain must be rebuilt before rendering.
    pub fn needs_recreate(self) -> bool {
        !matches!(self, Self::Acquired(_))
    }
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the chain must be rebuilt before the next frame.
    pub fn needs_recreate(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain with transfer-destination and color-attachment usage.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let image_count = select_image_count(surface_capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let swapchain = swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut chain = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };

        // Views are created one by one so a failure part-way still tears
        // down everything built so far.
        let result = (|| {
            chain.images = swapchain_loader.get_swapchain_images(swapchain)?;
            for &image in &chain.images {
                let view = create_view_2d(
                    device,
                    image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )?;
                chain.image_views.push(view);
            }
            Ok::<(), GpuError>(())
        })();
        if let Err(e) = result {
            chain.destroy(device, swapchain_loader);
            return Err(e);
        }

        info!(
            "Swapchain created: {}x{} {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            chain.images.len()
        );

        Ok(chain)
    }

    /// Number of images in the chain.
    pub fn image_count(&self) -> u32 {
        u32::try_from(self.images.len()).unwrap_or(u32::MAX)
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            u64::MAX,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
            Ok((index, true)) => {
                debug!("Acquire reported suboptimal swapchain");
                Ok(AcquireOutcome::Suboptimal(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Acquire reported out-of-date swapchain");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image once `wait_semaphore` is signaled.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match swapchain_loader.queue_present(queue, &present_info) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => {
                debug!("Present reported suboptimal swapchain");
                Ok(PresentOutcome::Suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Present reported out-of-date swapchain");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Destroy all image views, then the chain. Safe to call twice.
    ///
    /// # Safety
    /// All handles must be valid and the swapchain must not be in use.
    pub unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

/// Pick the desired format if supported, else the first one offered.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| {
            f.format == DESIRED_FORMAT.format && f.color_space == DESIRED_FORMAT.color_space
        })
        .or_else(|| available.first().copied())
        .ok_or_else(|| GpuError::SwapchainCreation("Surface reports no formats".to_string()))
}

/// One more image than the minimum, capped by the maximum when there is one.
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Calculate swapchain extent, never smaller than 1x1.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    let extent = if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    };

    vk::Extent2D {
        width: extent.width.max(1),
        height: extent.height.max(1),
    }
}
