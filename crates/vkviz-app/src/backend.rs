//! GPU backend seam.
//!
//! The orchestrator drives presentation, offscreen targets, and frame slots
//! only through [`RenderBackend`], so the frame loop runs unchanged against
//! the Vulkan implementation or a test double.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::renderer::RendererCaps;
use ash::vk;
use vkviz_gpu::{AcquireOutcome, AttachmentView, PresentOutcome};
use vkviz_platform::Platform;

/// Images a frame renders into.
#[derive(Debug, Clone, Default)]
pub struct FrameTargets {
    pub extent: vk::Extent2D,
    pub swapchain_image: vk::Image,
    pub swapchain_view: vk::ImageView,
    pub swapchain_format: vk::Format,
    pub color: Vec<AttachmentView>,
    pub presentation: Option<AttachmentView>,
    pub depth: Option<AttachmentView>,
}

/// Device, presentation, and frame-slot operations used by the engine.
///
/// Recording methods take `&self` so the device can stay borrowed by
/// renderer callbacks between them.
pub trait RenderBackend<P: Platform>: Sized {
    /// Device bundle handed to renderer callbacks.
    type Device;

    /// Bootstrap the device against the platform's window.
    fn create(platform: &P, config: &EngineConfig) -> EngineResult<Self>;

    fn device(&self) -> &Self::Device;

    /// Build the swapchain as close to `width` x `height` as the surface
    /// allows and return the actual extent.
    fn create_swapchain(&mut self, width: u32, height: u32) -> EngineResult<vk::Extent2D>;

    /// Destroy the swapchain. No-op when there is none.
    ///
    /// The device is idle, so per-slot objects retired while the old chain
    /// was in use are released here too.
    fn destroy_swapchain(&mut self) -> EngineResult<()>;

    /// Allocate the offscreen targets `caps` asks for at `extent`.
    fn create_offscreen(&mut self, extent: vk::Extent2D, caps: &RendererCaps) -> EngineResult<()>;

    /// Release the offscreen targets. No-op when there are none.
    fn destroy_offscreen(&mut self) -> EngineResult<()>;

    fn extent(&self) -> vk::Extent2D;

    fn swapchain_image_count(&self) -> u32;

    fn swapchain_format(&self) -> vk::Format;

    /// Create `slot_count` frame slots and the timeline semaphore.
    fn create_frames(&mut self, slot_count: usize) -> EngineResult<()>;

    /// Destroy frame slots and the timeline semaphore. Safe to call twice.
    fn destroy_frames(&mut self);

    fn wait_idle(&self) -> EngineResult<()>;

    /// Block until the timeline semaphore reaches `value`.
    fn wait_timeline(&self, value: u64) -> EngineResult<()>;

    /// Acquire the next swapchain image, signaling `slot`'s image-acquired
    /// semaphore.
    fn acquire_image(&mut self, slot: usize) -> EngineResult<AcquireOutcome>;

    /// Reset `slot`'s command buffer and begin recording.
    fn begin_commands(&self, slot: usize) -> EngineResult<vk::CommandBuffer>;

    fn frame_targets(&self, image_index: u32) -> EngineResult<FrameTargets>;

    /// Move every offscreen attachment to its declared initial layout.
    fn prepare_attachments(&self, cmd: vk::CommandBuffer) -> EngineResult<()>;

    /// Blit the presentation attachment onto the swapchain image, leaving
    /// the swapchain image in `TRANSFER_DST_OPTIMAL`.
    fn blit_to_swapchain(&self, cmd: vk::CommandBuffer, image_index: u32) -> EngineResult<()>;

    /// Move the swapchain image to `TRANSFER_DST_OPTIMAL`, discarding it.
    fn transition_for_compose(&self, cmd: vk::CommandBuffer, image_index: u32)
        -> EngineResult<()>;

    /// Move the swapchain image from `TRANSFER_DST_OPTIMAL` to `PRESENT_SRC_KHR`.
    fn finish_for_present(&self, cmd: vk::CommandBuffer, image_index: u32) -> EngineResult<()>;

    /// End recording and submit, signaling the timeline with `signal_value`.
    fn submit(&self, slot: usize, cmd: vk::CommandBuffer, signal_value: u64) -> EngineResult<()>;

    fn present(&self, slot: usize, image_index: u32) -> EngineResult<PresentOutcome>;
}
