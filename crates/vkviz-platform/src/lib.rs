//! Windowing and input layer for vkviz.
//!
//! The engine only sees the [`Platform`] trait: poll or wait for events,
//! query the drawable size. [`WinitPlatform`] is the desktop
//! implementation; event records stay opaque winit events so renderers and
//! UI backends can interpret them directly.

mod error;
mod event;
mod winit_platform;

use std::time::Duration;

pub use error::{PlatformError, Result};
pub use event::{PlatformEvent, WindowSignal};
pub use winit_platform::WinitPlatform;

pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// Platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "vkviz".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

/// Event source and window the engine presents to.
pub trait Platform {
    /// Open the window described by `config`.
    fn create(config: &PlatformConfig) -> Result<Self>
    where
        Self: Sized;

    /// Append every pending event to `events` without blocking.
    fn poll_events(&mut self, events: &mut Vec<PlatformEvent>) -> Result<()>;

    /// Block until at least one event arrives or `timeout` elapses, then
    /// append what is pending.
    fn wait_events(&mut self, timeout: Duration, events: &mut Vec<PlatformEvent>) -> Result<()>;

    /// Current drawable size in physical pixels. May be 0x0 while minimized.
    fn pixel_size(&self) -> (u32, u32);
}
