//! Engine configuration.

use vkviz_gpu::DescriptorAllocatorConfig;
use vkviz_platform::PlatformConfig;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Whether the window can be resized by the user.
    pub resizable: bool,
    /// Number of frame slots recorded ahead of the device.
    pub frames_in_flight: usize,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Presentation always uses FIFO, so this is always on.
    pub vsync: bool,
    /// Sizing of the shared descriptor pool.
    pub descriptors: DescriptorAllocatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "vkviz".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            vsync: true,
            descriptors: DescriptorAllocatorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the number of frames in flight (at least one).
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn with_descriptors(mut self, descriptors: DescriptorAllocatorConfig) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Set size and title in one go.
    pub fn configure_window(&mut self, width: u32, height: u32, title: impl Into<String>) {
        self.width = width;
        self.height = height;
        self.title = title.into();
    }

    /// Slot count actually used, never zero even if the field was set directly.
    pub fn slot_count(&self) -> usize {
        self.frames_in_flight.max(1)
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: self.resizable,
        }
    }
}
