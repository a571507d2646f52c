//! Offscreen render targets.
//!
//! A single (not multi-buffered) set of device-local images the renderer
//! draws into before composition. The set is rewritten every frame, so it
//! is sized to the swapchain extent and rebuilt in lockstep with it.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::{create_view_2d, ImageTransition};
use crate::memory::GpuImage;
use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::{info, warn};

/// Format of the default HDR color target.
pub const HDR_COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Format of the default depth target.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// A named attachment a renderer asks the engine to allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRequest {
    pub name: String,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub aspect: vk::ImageAspectFlags,
    /// Layout the engine transitions the image to before recording each frame.
    pub initial_layout: vk::ImageLayout,
}

impl AttachmentRequest {
    /// HDR color target usable for storage writes, rendering, and blits.
    pub fn hdr_color(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: HDR_COLOR_FORMAT,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            samples: vk::SampleCountFlags::TYPE_1,
            aspect: vk::ImageAspectFlags::COLOR,
            initial_layout: vk::ImageLayout::GENERAL,
        }
    }

    /// 32-bit float depth target.
    pub fn depth(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: DEPTH_FORMAT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            samples: vk::SampleCountFlags::TYPE_1,
            aspect: vk::ImageAspectFlags::DEPTH,
            initial_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        }
    }

    pub fn with_format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_initial_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.initial_layout = layout;
        self
    }
}

/// Handles for one allocated attachment, as handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentView {
    pub name: String,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    /// Layout the image is in when recording callbacks start.
    pub layout: vk::ImageLayout,
}

/// An allocated attachment.
pub struct OffscreenAttachment {
    pub request: AttachmentRequest,
    pub image: GpuImage,
    pub view: vk::ImageView,
}

impl OffscreenAttachment {
    unsafe fn new(gpu: &GpuContext, request: &AttachmentRequest, extent: vk::Extent2D) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(request.format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(request.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(request.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut allocator = gpu.allocator().lock();
        let mut image = allocator
            .create_image(&create_info, MemoryLocation::GpuOnly, &request.name)
            .map_err(|e| GpuError::OffscreenCreation(format!("{}: {e}", request.name)))?;

        let view = match create_view_2d(gpu.device(), image.image, request.format, request.aspect) {
            Ok(view) => view,
            Err(e) => {
                allocator.free_image(&mut image)?;
                return Err(e);
            }
        };

        Ok(Self {
            request: request.clone(),
            image,
            view,
        })
    }

    pub fn view_info(&self) -> AttachmentView {
        AttachmentView {
            name: self.request.name.clone(),
            image: self.image.image,
            view: self.view,
            format: self.request.format,
            aspect: self.request.aspect,
            layout: self.request.initial_layout,
        }
    }

    unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        if self.view != vk::ImageView::null() {
            gpu.device().destroy_image_view(self.view, None);
            self.view = vk::ImageView::null();
        }
        gpu.allocator().lock().free_image(&mut self.image)
    }
}

/// Index of the color attachment to present, falling back to the first one
/// when `name` matches nothing.
pub fn resolve_presentation(color: &[AttachmentRequest], name: &str) -> Option<usize> {
    if color.is_empty() {
        return None;
    }
    color.iter().position(|a| a.name == name).or_else(|| {
        warn!(
            "Presentation attachment '{}' not declared, presenting '{}'",
            name, color[0].name
        );
        Some(0)
    })
}

/// The allocated offscreen attachments.
pub struct OffscreenTargets {
    color: Vec<OffscreenAttachment>,
    depth: Option<OffscreenAttachment>,
    presentation: Option<usize>,
    extent: vk::Extent2D,
}

impl OffscreenTargets {
    /// Allocate every requested attachment at `extent`.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        extent: vk::Extent2D,
        color: &[AttachmentRequest],
        depth: Option<&AttachmentRequest>,
        presentation: &str,
    ) -> Result<Self> {
        let mut targets = Self {
            color: Vec::with_capacity(color.len()),
            depth: None,
            presentation: resolve_presentation(color, presentation),
            extent,
        };

        let result = (|| {
            for request in color {
                targets.color.push(OffscreenAttachment::new(gpu, request, extent)?);
            }
            if let Some(request) = depth {
                targets.depth = Some(OffscreenAttachment::new(gpu, request, extent)?);
            }
            Ok::<(), GpuError>(())
        })();
        if let Err(e) = result {
            targets.destroy(gpu)?;
            return Err(e);
        }

        info!(
            "Offscreen targets created: {}x{}, {} color, depth: {}",
            extent.width,
            extent.height,
            targets.color.len(),
            targets.depth.is_some()
        );

        Ok(targets)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// The color attachment composed onto the swapchain.
    pub fn presentation(&self) -> Option<&OffscreenAttachment> {
        self.presentation.and_then(|i| self.color.get(i))
    }

    pub fn color_views(&self) -> Vec<AttachmentView> {
        self.color.iter().map(OffscreenAttachment::view_info).collect()
    }

    pub fn depth_view(&self) -> Option<AttachmentView> {
        self.depth.as_ref().map(OffscreenAttachment::view_info)
    }

    /// Transitions that discard last frame's contents and put every
    /// attachment in its declared initial layout.
    pub fn frame_start_transitions(&self) -> Vec<ImageTransition> {
        self.color
            .iter()
            .chain(self.depth.as_ref())
            .map(|a| {
                ImageTransition::new(
                    a.image.image,
                    a.request.aspect,
                    vk::ImageLayout::UNDEFINED,
                    a.request.initial_layout,
                )
            })
            .collect()
    }

    /// Release every attachment, depth first then color in reverse. Safe to call twice.
    ///
    /// # Safety
    /// The device must not be using any attachment.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        if let Some(mut depth) = self.depth.take() {
            depth.destroy(gpu)?;
        }
        while let Some(mut color) = self.color.pop() {
            color.destroy(gpu)?;
        }
        self.presentation = None;
        Ok(())
    }
}
