//! Image layout transitions, views, and blits (synchronization2).

use crate::error::Result;
use ash::vk;

/// Subresource range covering mip 0 / layer 0 of the given aspect.
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Pipeline stages and accesses that touch an image while it is in `layout`.
///
/// Used for both sides of a transition. `UNDEFINED` as a source waits on
/// all prior commands so a discarded image is never rewritten while a
/// previous frame still reads it.
pub fn layout_scope(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::UNDEFINED => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::NONE,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        ),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_READ,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            vk::AccessFlags2::NONE,
        ),
        _ => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
    }
}

/// A single image layout transition.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl ImageTransition {
    pub fn new(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Self {
        Self {
            image,
            aspect,
            old_layout,
            new_layout,
        }
    }

    /// Color-aspect transition.
    pub fn color(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Self {
        Self::new(image, vk::ImageAspectFlags::COLOR, old_layout, new_layout)
    }

    fn barrier(&self) -> vk::ImageMemoryBarrier2<'static> {
        let (src_stage, src_access) = layout_scope(self.old_layout);
        let (dst_stage, dst_access) = layout_scope(self.new_layout);

        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .image(self.image)
            .subresource_range(full_range(self.aspect))
    }
}

/// Record all transitions in one pipeline barrier.
///
/// # Safety
/// The command buffer must be in recording state.
pub unsafe fn record_transitions(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    transitions: &[ImageTransition],
) {
    if transitions.is_empty() {
        return;
    }
    let barriers: Vec<vk::ImageMemoryBarrier2> =
        transitions.iter().map(ImageTransition::barrier).collect();
    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}

/// Blit the whole of `src` onto the whole of `dst` with linear filtering.
///
/// `src` must be in `TRANSFER_SRC_OPTIMAL` and `dst` in `TRANSFER_DST_OPTIMAL`.
///
/// # Safety
/// The command buffer must be in recording state.
pub unsafe fn blit_color(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_extent: vk::Extent2D,
    dst: vk::Image,
    dst_extent: vk::Extent2D,
) {
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let region = vk::ImageBlit2::default()
        .src_subresource(layers)
        .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
        .dst_subresource(layers)
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)]);

    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .regions(std::slice::from_ref(&region))
        .filter(vk::Filter::LINEAR);

    device.cmd_blit_image2(cmd, &blit_info);
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(extent.width).unwrap_or(i32::MAX),
        y: i32::try_from(extent.height).unwrap_or(i32::MAX),
        z: 1,
    }
}

/// Create a 2D view over mip 0 / layer 0 of `image`.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_view_2d(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(full_range(aspect));

    Ok(device.create_image_view(&create_info, None)?)
}
