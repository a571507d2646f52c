//! Frame engine for vkviz.
//!
//! The [`Engine`] drives a renderer plugin through a fixed per-frame
//! pipeline: event intake, resize handling, slot reuse wait, image
//! acquisition, update, compute and graphics recording, composition, UI
//! overlay, submission, and presentation.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkviz_app::{run_engine, EngineConfig, FrameContext, GpuContext, Renderer};
//!
//! struct Blank;
//!
//! impl Renderer for Blank {
//!     fn record_graphics(
//!         &mut self,
//!         _cmd: vk::CommandBuffer,
//!         _gpu: &GpuContext,
//!         _frame: &FrameContext,
//!     ) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_engine(EngineConfig::new("blank"), Blank)
//! }
//! ```

mod backend;
mod config;
mod engine;
mod error;
mod frame;
mod renderer;
mod runner;
mod state;
mod ui;
mod vulkan;

#[cfg(test)]
mod mock;

pub use backend::{FrameTargets, RenderBackend};
pub use config::EngineConfig;
pub use engine::{Engine, ExitHandle, IterationOutcome, IDLE_WAIT};
pub use error::{EngineError, EngineResult};
pub use frame::{FrameClock, FrameContext};
pub use renderer::{PresentationMode, Renderer, RendererCaps, RendererStats};
pub use runner::{init_logging, run_engine};
pub use state::{EnginePhase, EngineState};
pub use ui::{OverlayTarget, UiOverlay, UiPanel};
pub use vulkan::VulkanBackend;

/// The engine on a winit window with the Vulkan backend.
pub type VulkanEngine = Engine<vkviz_platform::WinitPlatform, VulkanBackend>;

// Re-export commonly used types for convenience
pub use vkviz_gpu::{AttachmentRequest, AttachmentView, GpuContext};
pub use vkviz_platform::{DeviceEvent, DeviceId, PlatformEvent, WindowEvent, WindowSignal};
