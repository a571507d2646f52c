//! vkviz demo
//!
//! Clears the HDR color target to a slowly cycling color and lets the engine
//! blit it to the window. Exercises the whole frame pipeline with the
//! smallest possible renderer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkviz-demo
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use ash::vk;
use tracing::info;
use vkviz_app::{
    run_engine, EngineConfig, FrameContext, GpuContext, PlatformEvent, Renderer, RendererCaps,
    WindowEvent,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Seconds for one full trip around the hue wheel.
const HUE_PERIOD: f64 = 8.0;

struct ClearRenderer {
    clear: [f32; 4],
    paused: bool,
    frames: u64,
}

impl ClearRenderer {
    const fn new() -> Self {
        Self {
            clear: [0.0, 0.0, 0.0, 1.0],
            paused: false,
            frames: 0,
        }
    }
}

/// Fully saturated color at `hue` in `[0, 1)`.
fn hue_to_rgb(hue: f32) -> [f32; 3] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    match h as u32 {
        0 => [1.0, x, 0.0],
        1 => [x, 1.0, 0.0],
        2 => [0.0, 1.0, x],
        3 => [0.0, x, 1.0],
        4 => [x, 0.0, 1.0],
        _ => [1.0, 0.0, x],
    }
}

impl Renderer for ClearRenderer {
    fn negotiate_capabilities(&mut self, _gpu: Option<&GpuContext>, caps: &mut RendererCaps) {
        // No overlay backend ships with the demo.
        caps.enable_ui = false;
        caps.depth_attachment = None;
    }

    fn initialize(
        &mut self,
        gpu: &GpuContext,
        caps: &RendererCaps,
        extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        info!(
            "Clear renderer ready on {:?} at {}x{} ({:?})",
            gpu.capabilities().vendor,
            extent.width,
            extent.height,
            caps.presentation_mode
        );
        Ok(())
    }

    fn update(&mut self, _gpu: &GpuContext, frame: &FrameContext) -> anyhow::Result<()> {
        if !self.paused {
            let [r, g, b] = hue_to_rgb((frame.elapsed / HUE_PERIOD) as f32);
            // Keep the HDR target in a comfortable range.
            self.clear = [r * 0.6, g * 0.6, b * 0.6, 1.0];
        }
        Ok(())
    }

    fn record_graphics(
        &mut self,
        cmd: vk::CommandBuffer,
        gpu: &GpuContext,
        frame: &FrameContext,
    ) -> anyhow::Result<()> {
        let Some(target) = &frame.color else {
            anyhow::bail!("no color target to clear");
        };
        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1);
        let clear = vk::ClearColorValue {
            float32: self.clear,
        };
        unsafe {
            gpu.device()
                .cmd_clear_color_image(cmd, target.image, target.layout, &clear, &[range]);
        }
        self.frames += 1;
        Ok(())
    }

    fn on_event(
        &mut self,
        _gpu: &GpuContext,
        event: &PlatformEvent,
        _frame: Option<&FrameContext>,
    ) {
        if let PlatformEvent::Window(WindowEvent::MouseInput { state, .. }) = event {
            if !state.is_pressed() {
                return;
            }
            self.paused = !self.paused;
            info!("Color cycling {}", if self.paused { "paused" } else { "resumed" });
        }
    }

    fn destroy(&mut self, _gpu: &GpuContext) {
        info!("Clear renderer recorded {} frames", self.frames);
    }
}

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::new("vkviz demo").with_size(WIDTH, HEIGHT);
    run_engine(config, ClearRenderer::new())
}
