//! Engine state record.
//!
//! Mutated only by the orchestrator and by window events; renderers see a
//! snapshot of it through the frame context.

use crate::config::EngineConfig;
use vkviz_platform::WindowSignal;

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Before `init`, or after cleanup.
    Idle,
    /// Initialized; frames may be stepped or the loop entered.
    Running,
    /// Inside `cleanup`.
    ShuttingDown,
}

/// Mutable engine flags and counters.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub title: String,
    pub width: u32,
    pub height: u32,

    pub initialized: bool,
    /// The run loop is active.
    pub running: bool,
    /// False while minimized; the loop then idles without GPU work.
    pub should_render: bool,
    /// Swapchain recreation is pending for the next iteration.
    pub resize_requested: bool,
    pub focused: bool,
    pub minimized: bool,
    pub shutting_down: bool,

    /// Number of frames submitted so far.
    pub frame_number: u64,
    /// Seconds since the previous iteration.
    pub delta_time: f32,
    /// Seconds since the clock started.
    pub elapsed: f64,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            title: config.title.clone(),
            width: config.width,
            height: config.height,
            initialized: false,
            running: false,
            should_render: false,
            resize_requested: false,
            focused: true,
            minimized: false,
            shutting_down: false,
            frame_number: 0,
            delta_time: 0.0,
            elapsed: 0.0,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        if self.shutting_down {
            EnginePhase::ShuttingDown
        } else if self.initialized {
            EnginePhase::Running
        } else {
            EnginePhase::Idle
        }
    }

    /// Apply a window signal. Returns `true` if it asks the loop to stop.
    pub fn apply_signal(&mut self, signal: WindowSignal) -> bool {
        match signal {
            WindowSignal::Quit => {
                self.running = false;
                return true;
            }
            WindowSignal::Minimized => {
                self.minimized = true;
                self.should_render = false;
            }
            WindowSignal::Restored => {
                self.restore();
            }
            WindowSignal::Resized => {
                self.restore();
            }
            WindowSignal::FocusGained => self.focused = true,
            WindowSignal::FocusLost => self.focused = false,
        }
        false
    }

    // Coming back from a minimized state always rebuilds the swapchain,
    // since the surface may have changed while hidden.
    fn restore(&mut self) {
        self.minimized = false;
        self.should_render = true;
        self.resize_requested = true;
    }
}
