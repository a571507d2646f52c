//! Vulkan implementation of the backend seam.

use ash::vk;
use raw_window_handle::HasDisplayHandle;
use tracing::{debug, error, info};
use vkviz_gpu::command::{end_command_buffer, reset_and_begin};
use vkviz_gpu::{
    blit_color, record_transitions, submit_frame, AcquireOutcome, FrameRing, FrameSubmission,
    GpuContext, GpuContextBuilder, GpuError, ImageTransition, OffscreenTargets, PresentOutcome,
    SurfaceContext, Swapchain, TimelineSemaphore,
};
use vkviz_platform::{PlatformError, WinitPlatform};

use crate::backend::{FrameTargets, RenderBackend};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::renderer::RendererCaps;

/// Device, surface, swapchain, offscreen targets, and frame slots.
pub struct VulkanBackend {
    frames: Option<FrameRing>,
    timeline: Option<TimelineSemaphore>,
    offscreen: Option<OffscreenTargets>,
    swapchain: Option<Swapchain>,
    surface: SurfaceContext,
    gpu: GpuContext,
}

impl VulkanBackend {
    fn swapchain(&self) -> Result<&Swapchain, GpuError> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("No swapchain".to_string()))
    }

    fn frames(&self) -> Result<&FrameRing, GpuError> {
        self.frames
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Frame slots not created".to_string()))
    }

    fn timeline(&self) -> Result<&TimelineSemaphore, GpuError> {
        self.timeline
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Timeline not created".to_string()))
    }

    fn swapchain_image(&self, image_index: u32) -> Result<vk::Image, GpuError> {
        self.swapchain()?
            .images
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| GpuError::InvalidState(format!("No swapchain image {image_index}")))
    }

    fn teardown(&mut self) {
        unsafe {
            log_failure("wait idle before teardown", self.gpu.wait_idle());
            self.destroy_frames();
            if let Some(mut offscreen) = self.offscreen.take() {
                log_failure("destroy offscreen targets", offscreen.destroy(&self.gpu));
            }
            if let Some(mut swapchain) = self.swapchain.take() {
                swapchain.destroy(self.gpu.device(), &self.surface.swapchain_loader);
            }
            self.surface.destroy();
        }
    }
}

impl RenderBackend<WinitPlatform> for VulkanBackend {
    type Device = GpuContext;

    fn create(platform: &WinitPlatform, config: &EngineConfig) -> EngineResult<Self> {
        let display = platform
            .display_handle()
            .map_err(|e| PlatformError::Handle(e.to_string()))?
            .as_raw();

        let gpu = GpuContextBuilder::new()
            .app_name(config.title.clone())
            .validation(config.validation)
            .descriptor_config(config.descriptors.clone())
            .build(display)?;

        let window = platform.window()?;
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        Ok(Self {
            frames: None,
            timeline: None,
            offscreen: None,
            swapchain: None,
            surface,
            gpu,
        })
    }

    fn device(&self) -> &GpuContext {
        &self.gpu
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> EngineResult<vk::Extent2D> {
        let swapchain = unsafe { self.surface.create_swapchain(&self.gpu, width, height)? };
        let extent = swapchain.extent;
        self.swapchain = Some(swapchain);
        Ok(extent)
    }

    fn destroy_swapchain(&mut self) -> EngineResult<()> {
        if let Some(mut swapchain) = self.swapchain.take() {
            unsafe { swapchain.destroy(self.gpu.device(), &self.surface.swapchain_loader) };
            debug!("Swapchain destroyed");
        }
        // Semaphores abandoned by suboptimal acquires on the old chain.
        if let Some(frames) = self.frames.as_mut() {
            unsafe { frames.release_retired() };
        }
        Ok(())
    }

    fn create_offscreen(&mut self, extent: vk::Extent2D, caps: &RendererCaps) -> EngineResult<()> {
        if !caps.uses_offscreen() {
            return Ok(());
        }
        let targets = unsafe {
            OffscreenTargets::new(
                &self.gpu,
                extent,
                &caps.color_attachments,
                caps.depth_attachment.as_ref(),
                &caps.presentation_attachment,
            )?
        };
        self.offscreen = Some(targets);
        Ok(())
    }

    fn destroy_offscreen(&mut self) -> EngineResult<()> {
        if let Some(mut offscreen) = self.offscreen.take() {
            unsafe { offscreen.destroy(&self.gpu)? };
            debug!("Offscreen targets destroyed");
        }
        Ok(())
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map(|swapchain| swapchain.extent)
            .unwrap_or_default()
    }

    fn swapchain_image_count(&self) -> u32 {
        self.swapchain.as_ref().map_or(0, Swapchain::image_count)
    }

    fn swapchain_format(&self) -> vk::Format {
        self.swapchain
            .as_ref()
            .map_or(vk::Format::UNDEFINED, |swapchain| swapchain.format)
    }

    fn create_frames(&mut self, slot_count: usize) -> EngineResult<()> {
        let device = self.gpu.device_arc();
        let frames =
            unsafe { FrameRing::new(&device, self.gpu.graphics_queue_family(), slot_count)? };
        let timeline = match unsafe { TimelineSemaphore::new(&device) } {
            Ok(timeline) => timeline,
            Err(e) => {
                let mut frames = frames;
                unsafe { frames.destroy() };
                return Err(e.into());
            }
        };
        self.frames = Some(frames);
        self.timeline = Some(timeline);
        info!("Frame slots created: {}", slot_count);
        Ok(())
    }

    fn destroy_frames(&mut self) {
        unsafe {
            if let Some(mut frames) = self.frames.take() {
                frames.destroy();
            }
            if let Some(timeline) = self.timeline.take() {
                timeline.destroy(self.gpu.device());
            }
        }
    }

    fn wait_idle(&self) -> EngineResult<()> {
        Ok(self.gpu.wait_idle()?)
    }

    fn wait_timeline(&self, value: u64) -> EngineResult<()> {
        unsafe { self.timeline()?.wait(self.gpu.device(), value)? };
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> EngineResult<AcquireOutcome> {
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("No swapchain".to_string()))?;
        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Frame slots not created".to_string()))?;

        let semaphore = frames.slot(slot)?.image_acquired();
        let outcome =
            unsafe { swapchain.acquire_next_image(&self.surface.swapchain_loader, semaphore)? };

        // The abandoned acquire still signals the semaphore and nothing will
        // wait on it, so the slot needs a fresh one.
        if let AcquireOutcome::Suboptimal(_) = outcome {
            unsafe { frames.slot_mut(slot)?.recycle_image_acquired()? };
        }
        Ok(outcome)
    }

    fn begin_commands(&self, slot: usize) -> EngineResult<vk::CommandBuffer> {
        let cmd = self.frames()?.slot(slot)?.command_buffer();
        unsafe { reset_and_begin(self.gpu.device(), cmd)? };
        Ok(cmd)
    }

    fn frame_targets(&self, image_index: u32) -> EngineResult<FrameTargets> {
        let swapchain = self.swapchain()?;
        let index = image_index as usize;
        let (Some(&image), Some(&view)) =
            (swapchain.images.get(index), swapchain.image_views.get(index))
        else {
            return Err(
                GpuError::InvalidState(format!("No swapchain image {image_index}")).into(),
            );
        };

        let mut targets = FrameTargets {
            extent: swapchain.extent,
            swapchain_image: image,
            swapchain_view: view,
            swapchain_format: swapchain.format,
            ..FrameTargets::default()
        };
        if let Some(offscreen) = &self.offscreen {
            targets.color = offscreen.color_views();
            targets.presentation = offscreen.presentation().map(|a| a.view_info());
            targets.depth = offscreen.depth_view();
        }
        Ok(targets)
    }

    fn prepare_attachments(&self, cmd: vk::CommandBuffer) -> EngineResult<()> {
        if let Some(offscreen) = &self.offscreen {
            unsafe {
                record_transitions(self.gpu.device(), cmd, &offscreen.frame_start_transitions());
            }
        }
        Ok(())
    }

    fn blit_to_swapchain(&self, cmd: vk::CommandBuffer, image_index: u32) -> EngineResult<()> {
        let offscreen = self
            .offscreen
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("No offscreen targets".to_string()))?;
        let source = offscreen
            .presentation()
            .ok_or_else(|| GpuError::InvalidState("No presentation attachment".to_string()))?;
        let target = self.swapchain_image(image_index)?;
        let device = self.gpu.device();

        unsafe {
            record_transitions(
                device,
                cmd,
                &[
                    ImageTransition::color(
                        source.image.image,
                        source.request.initial_layout,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    ),
                    ImageTransition::color(
                        target,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    ),
                ],
            );
            blit_color(
                device,
                cmd,
                source.image.image,
                offscreen.extent(),
                target,
                self.swapchain()?.extent,
            );
        }
        Ok(())
    }

    fn transition_for_compose(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> EngineResult<()> {
        let target = self.swapchain_image(image_index)?;
        unsafe {
            record_transitions(
                self.gpu.device(),
                cmd,
                &[ImageTransition::color(
                    target,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )],
            );
        }
        Ok(())
    }

    fn finish_for_present(&self, cmd: vk::CommandBuffer, image_index: u32) -> EngineResult<()> {
        let target = self.swapchain_image(image_index)?;
        unsafe {
            record_transitions(
                self.gpu.device(),
                cmd,
                &[ImageTransition::color(
                    target,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                )],
            );
        }
        Ok(())
    }

    fn submit(&self, slot: usize, cmd: vk::CommandBuffer, signal_value: u64) -> EngineResult<()> {
        let frame = self.frames()?.slot(slot)?;
        let device = self.gpu.device();
        let submission = FrameSubmission {
            command_buffer: cmd,
            image_acquired: frame.image_acquired(),
            render_complete: frame.render_complete(),
            timeline: self.timeline()?.handle(),
            timeline_value: signal_value,
        };
        unsafe {
            end_command_buffer(device, cmd)?;
            submit_frame(device, self.gpu.graphics_queue(), &submission)?;
        }
        Ok(())
    }

    fn present(&self, slot: usize, image_index: u32) -> EngineResult<PresentOutcome> {
        let wait = self.frames()?.slot(slot)?.render_complete();
        let outcome = unsafe {
            self.swapchain()?.present(
                &self.surface.swapchain_loader,
                self.gpu.graphics_queue(),
                image_index,
                wait,
            )?
        };
        Ok(outcome)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Log a failed teardown step and carry on. Returns whether it succeeded.
fn log_failure(step: &str, result: Result<(), GpuError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to {step}: {e}");
            false
        }
    }
}
