//! Renderer plugin contract.

use crate::frame::FrameContext;
use ash::vk;
use vkviz_gpu::{AttachmentRequest, GpuContext};
use vkviz_platform::PlatformEvent;

/// How the final image reaches the swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationMode {
    /// The engine blits the presentation attachment onto the swapchain image.
    #[default]
    EngineBlit,
    /// The renderer's `compose` callback writes the swapchain image.
    RendererComposite,
    /// `record_graphics` writes the swapchain image; no offscreen targets exist.
    DirectToSwapchain,
}

/// What a renderer asks of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererCaps {
    /// Draw the UI overlay, if one is attached.
    pub enable_ui: bool,
    pub presentation_mode: PresentationMode,
    pub color_attachments: Vec<AttachmentRequest>,
    pub depth_attachment: Option<AttachmentRequest>,
    /// Name of the color attachment presented in `EngineBlit` mode.
    pub presentation_attachment: String,
    /// Call `record_compute` before `record_graphics` each frame.
    pub uses_compute: bool,
}

impl Default for RendererCaps {
    fn default() -> Self {
        Self {
            enable_ui: true,
            presentation_mode: PresentationMode::EngineBlit,
            color_attachments: vec![AttachmentRequest::hdr_color("hdr_color")],
            depth_attachment: Some(AttachmentRequest::depth("depth")),
            presentation_attachment: "hdr_color".to_string(),
            uses_compute: false,
        }
    }
}

impl RendererCaps {
    /// Whether offscreen targets are allocated at all.
    pub fn uses_offscreen(&self) -> bool {
        self.presentation_mode != PresentationMode::DirectToSwapchain
    }

    /// Check the caps can be satisfied.
    pub fn validate(&self) -> Result<(), String> {
        if self.presentation_mode == PresentationMode::EngineBlit {
            if self.color_attachments.is_empty() {
                return Err("EngineBlit presentation needs a color attachment".to_string());
            }
            let presented = self
                .color_attachments
                .iter()
                .find(|a| a.name == self.presentation_attachment)
                .unwrap_or(&self.color_attachments[0]);
            if !presented.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
                return Err(format!(
                    "Presentation attachment '{}' lacks TRANSFER_SRC usage",
                    presented.name
                ));
            }
            if presented.samples != vk::SampleCountFlags::TYPE_1 {
                return Err(format!(
                    "Presentation attachment '{}' is multisampled",
                    presented.name
                ));
            }
        }
        Ok(())
    }
}

/// Per-frame statistics reported by a renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RendererStats {
    pub draw_calls: u32,
    pub dispatches: u32,
    pub triangles: u64,
    pub cpu_ms: f32,
    pub gpu_ms: f32,
}

/// Draw logic plugged into the engine.
///
/// Only [`Renderer::record_graphics`] is required; every other hook
/// defaults to doing nothing. `D` is the device bundle handed to callbacks.
///
/// Recording callbacks receive a command buffer in the recording state,
/// after the engine's barriers for the declared attachments. At the end of
/// `record_graphics` the presentation attachment must be back in its
/// declared initial layout.
#[allow(unused_variables)]
pub trait Renderer<D = GpuContext> {
    /// Declare attachments and presentation strategy.
    ///
    /// Called once with no device before bootstrap, then again with the
    /// device; the second result is the one used.
    fn negotiate_capabilities(&mut self, device: Option<&D>, caps: &mut RendererCaps) {}

    /// Create long-lived resources. Called once during `init`.
    fn initialize(
        &mut self,
        device: &D,
        caps: &RendererCaps,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources. Called once during cleanup with the device idle.
    fn destroy(&mut self, device: &D) {}

    /// A new swapchain (and offscreen targets) exist at `extent`.
    fn on_swapchain_ready(&mut self, device: &D, extent: vk::Extent2D) -> anyhow::Result<()> {
        Ok(())
    }

    /// The swapchain is about to be destroyed.
    fn on_swapchain_destroy(&mut self, device: &D) {}

    /// CPU-side simulation step, before any recording for the frame.
    fn update(&mut self, device: &D, frame: &FrameContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Record compute work. Only called when `uses_compute` is set.
    fn record_compute(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &D,
        frame: &FrameContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Record draw commands.
    fn record_graphics(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &D,
        frame: &FrameContext,
    ) -> anyhow::Result<()>;

    /// Write the swapchain image in `RendererComposite` mode. The image is
    /// in `TRANSFER_DST_OPTIMAL` on entry and must be left there.
    fn compose(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &D,
        frame: &FrameContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Raw platform event, with the last frame's context if there was one.
    ///
    /// After the swapchain is rebuilt the context carries the new extent and
    /// null image handles until the next frame is recorded.
    fn on_event(&mut self, device: &D, event: &PlatformEvent, frame: Option<&FrameContext>) {}

    /// Build this frame's UI, between the overlay's begin and render.
    fn on_ui(&mut self, device: &D, frame: &FrameContext) {}

    /// Reload shaders and other assets. The device is idle.
    fn reload_assets(&mut self, device: &D) -> anyhow::Result<()> {
        Ok(())
    }

    fn stats(&self) -> RendererStats {
        RendererStats::default()
    }
}
