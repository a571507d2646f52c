//! UI overlay contract.
//!
//! The engine drives an immediate-mode UI backend through this trait; the
//! backend itself lives in the embedding application.

use crate::frame::FrameContext;
use ash::vk;
use vkviz_gpu::GpuContext;
use vkviz_platform::PlatformEvent;

/// A persistent panel, drawn every frame until the overlay shuts down.
pub type UiPanel = Box<dyn FnMut(&FrameContext)>;

/// Image the overlay draws onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    /// Layout the image is in when the overlay is recorded.
    pub layout: vk::ImageLayout,
}

/// Immediate-mode UI drawn over the final image.
pub trait UiOverlay<D = GpuContext> {
    /// Create backend resources for swapchain images of `format`.
    fn attach(&mut self, device: &D, format: vk::Format, image_count: u32) -> anyhow::Result<()>;

    /// Start a UI frame.
    fn begin_frame(&mut self, frame: &FrameContext);

    /// Feed one input event.
    fn process_event(&mut self, event: &PlatformEvent);

    fn add_panel(&mut self, panel: UiPanel);

    /// Record the overlay onto `target`, loading its existing contents.
    /// The image must be left in `PRESENT_SRC_KHR`.
    fn render_overlay(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &D,
        target: &OverlayTarget,
    ) -> anyhow::Result<()>;

    /// The swapchain was rebuilt with `count` images.
    fn set_min_image_count(&mut self, count: u32);

    /// Release backend resources. The device is idle.
    fn shutdown(&mut self, device: &D);
}
