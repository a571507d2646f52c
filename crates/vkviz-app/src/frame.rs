//! Per-frame context and timing.

use crate::backend::FrameTargets;
use ash::vk;
use std::time::Instant;
use vkviz_gpu::AttachmentView;

/// Snapshot of one frame, handed to renderer and UI callbacks.
///
/// Built fresh every iteration. The orchestrator keeps the latest one
/// around only to give input events some frame to correlate with.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Absolute frame number.
    pub frame_number: u64,
    /// Frame slot recording this frame.
    pub slot: usize,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    pub extent: vk::Extent2D,
    /// Seconds since the previous iteration.
    pub delta_time: f32,
    /// Seconds since the engine clock started.
    pub elapsed: f64,

    pub swapchain_image: vk::Image,
    pub swapchain_view: vk::ImageView,
    pub swapchain_format: vk::Format,

    /// The color attachment composed onto the swapchain.
    pub color: Option<AttachmentView>,
    pub depth: Option<AttachmentView>,
    /// Every declared color attachment, in declaration order.
    pub attachments: Vec<AttachmentView>,
}

impl FrameContext {
    pub(crate) fn new(
        frame_number: u64,
        slot: usize,
        image_index: u32,
        timing: (f32, f64),
        targets: FrameTargets,
    ) -> Self {
        Self {
            frame_number,
            slot,
            image_index,
            extent: targets.extent,
            delta_time: timing.0,
            elapsed: timing.1,
            swapchain_image: targets.swapchain_image,
            swapchain_view: targets.swapchain_view,
            swapchain_format: targets.swapchain_format,
            color: targets.presentation,
            depth: targets.depth,
            attachments: targets.color,
        }
    }

    /// Look up a color attachment by name.
    pub fn attachment(&self, name: &str) -> Option<&AttachmentView> {
        self.attachments.iter().find(|a| a.name == name)
    }

    /// Width / height of the current extent.
    pub fn aspect_ratio(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.extent.width as f32 / self.extent.height.max(1) as f32;
        ratio
    }
}

/// Monotonic frame clock.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self::starting_at(now)
    }

    pub fn starting_at(start: Instant) -> Self {
        Self { start, last: start }
    }

    /// Advance to now, returning `(delta, elapsed)` in seconds.
    pub fn tick(&mut self) -> (f32, f64) {
        self.tick_at(Instant::now())
    }

    /// Advance to `now`. Earlier instants yield a zero delta.
    pub fn tick_at(&mut self, now: Instant) -> (f32, f64) {
        let delta = now.saturating_duration_since(self.last).as_secs_f32();
        if now > self.last {
            self.last = now;
        }
        let elapsed = self.last.duration_since(self.start).as_secs_f64();
        (delta, elapsed)
    }
}
