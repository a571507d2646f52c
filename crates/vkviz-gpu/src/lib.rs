//! Vulkan layer for the vkviz frame engine.
//!
//! This crate provides:
//! - Instance, device, and queue bootstrap with optional validation
//! - Memory and descriptor allocation
//! - Swapchain and offscreen render target management
//! - Per-frame slots paced by a single timeline semaphore
//! - Image barrier and blit helpers built on synchronization2

pub mod capabilities;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod image;
pub mod instance;
pub mod memory;
pub mod offscreen;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod timeline;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use deferred::DeletionQueue;
pub use descriptors::{DescriptorAllocator, DescriptorAllocatorConfig, PoolSizeRatio};
pub use error::{GpuError, Result};
pub use frame::{FrameRing, FrameSlot, RetiredSemaphores};
pub use image::{blit_color, record_transitions, ImageTransition};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use offscreen::{AttachmentRequest, AttachmentView, OffscreenAttachment, OffscreenTargets};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use sync::{create_semaphore, submit_frame, FrameSubmission};
pub use timeline::{FrameTimeline, TimelineSemaphore};
