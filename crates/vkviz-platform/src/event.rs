//! Event records and their window-lifecycle meaning.

use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// One event delivered by the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    Window(WindowEvent),
    Device {
        device_id: DeviceId,
        event: DeviceEvent,
    },
    /// The event loop itself is shutting down.
    Quit,
}

/// Window lifecycle changes the frame loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    Quit,
    Minimized,
    Restored,
    /// The drawable size changed; the new size is read at recreation time.
    Resized,
    FocusGained,
    FocusLost,
}

impl PlatformEvent {
    /// Classify the event, or `None` for pure input events.
    pub fn signal(&self) -> Option<WindowSignal> {
        match self {
            Self::Quit => Some(WindowSignal::Quit),
            Self::Device { .. } => None,
            Self::Window(event) => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(WindowSignal::Quit),
                WindowEvent::Resized(size) if size.width == 0 || size.height == 0 => {
                    Some(WindowSignal::Minimized)
                }
                WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                    Some(WindowSignal::Resized)
                }
                WindowEvent::Occluded(true) => Some(WindowSignal::Minimized),
                WindowEvent::Occluded(false) => Some(WindowSignal::Restored),
                WindowEvent::Focused(true) => Some(WindowSignal::FocusGained),
                WindowEvent::Focused(false) => Some(WindowSignal::FocusLost),
                _ => None,
            },
        }
    }
}
