//! winit-backed platform.
//!
//! The engine owns its loop, so instead of handing control to
//! `EventLoop::run_app` the event loop is pumped once per iteration and the
//! delivered events are buffered for the engine to drain.

use crate::error::{PlatformError, Result};
use crate::event::PlatformEvent;
use crate::{Platform, PlatformConfig};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

/// Pump attempts made while waiting for the first `resumed` callback.
const STARTUP_PUMPS: usize = 32;

/// Collects events delivered during one pump.
struct EventCollector {
    /// Attributes of the window still to be created, taken on first resume.
    pending_window: Option<WindowAttributes>,
    window: Option<Arc<Window>>,
    events: Vec<PlatformEvent>,
    error: Option<PlatformError>,
}

impl ApplicationHandler for EventCollector {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.pending_window.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => {
                let size = window.inner_size();
                info!("Window created: {}x{}", size.width, size.height);
                self.window = Some(Arc::new(window));
            }
            Err(e) => self.error = Some(PlatformError::WindowCreation(e.to_string())),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.events.push(PlatformEvent::Window(event));
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        self.events.push(PlatformEvent::Device { device_id, event });
    }
}

/// Desktop window plus the event loop feeding it.
pub struct WinitPlatform {
    event_loop: EventLoop<()>,
    collector: EventCollector,
    exited: bool,
}

impl WinitPlatform {
    /// The window, for surface creation.
    pub fn window(&self) -> Result<&Arc<Window>> {
        self.collector
            .window
            .as_ref()
            .ok_or_else(|| PlatformError::Handle("Window not created".to_string()))
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = &self.collector.window {
            window.set_title(title);
        }
    }

    fn pump(&mut self, timeout: Duration, events: &mut Vec<PlatformEvent>) -> Result<()> {
        if !self.exited {
            let status = self
                .event_loop
                .pump_app_events(Some(timeout), &mut self.collector);
            if let PumpStatus::Exit(code) = status {
                debug!("Event loop exited with code {code}");
                self.exited = true;
                self.collector.events.push(PlatformEvent::Quit);
            }
        }

        if let Some(error) = self.collector.error.take() {
            return Err(error);
        }
        events.append(&mut self.collector.events);
        Ok(())
    }
}

impl Platform for WinitPlatform {
    fn create(config: &PlatformConfig) -> Result<Self> {
        let event_loop = EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;

        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);

        let mut platform = Self {
            event_loop,
            collector: EventCollector {
                pending_window: Some(attributes),
                window: None,
                events: Vec::new(),
                error: None,
            },
            exited: false,
        };

        // Events seen while starting up stay buffered for the first poll.
        let mut startup_events = Vec::new();
        for _ in 0..STARTUP_PUMPS {
            platform.pump(Duration::from_millis(10), &mut startup_events)?;
            if platform.collector.window.is_some() || platform.exited {
                break;
            }
        }
        platform.collector.events = startup_events;

        if platform.collector.window.is_none() {
            return Err(PlatformError::WindowCreation(
                "Event loop never resumed".to_string(),
            ));
        }
        Ok(platform)
    }

    fn poll_events(&mut self, events: &mut Vec<PlatformEvent>) -> Result<()> {
        self.pump(Duration::ZERO, events)
    }

    fn wait_events(&mut self, timeout: Duration, events: &mut Vec<PlatformEvent>) -> Result<()> {
        self.pump(timeout, events)
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.collector.window.as_ref().map_or((0, 0), |window| {
            let size = window.inner_size();
            (size.width, size.height)
        })
    }
}

impl HasDisplayHandle for WinitPlatform {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}

impl HasWindowHandle for WinitPlatform {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.collector
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}
