//! Binary semaphores and frame submission.

use crate::error::Result;
use ash::vk;

/// Create a binary semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Semaphores one frame submission waits on and signals.
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission {
    pub command_buffer: vk::CommandBuffer,
    /// Binary semaphore signaled by image acquisition.
    pub image_acquired: vk::Semaphore,
    /// Binary semaphore presentation waits on.
    pub render_complete: vk::Semaphore,
    /// Timeline semaphore and the value this submission signals.
    pub timeline: vk::Semaphore,
    pub timeline_value: u64,
}

/// Submit a frame's command buffer with synchronization2.
///
/// Waits on `image_acquired` before color output and signals both
/// `render_complete` and the timeline value once all graphics work is done.
///
/// # Safety
/// All handles must be valid and the command buffer must be executable.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    submission: &FrameSubmission,
) -> Result<()> {
    let command_buffer_info =
        vk::CommandBufferSubmitInfo::default().command_buffer(submission.command_buffer);

    let wait_info = vk::SemaphoreSubmitInfo::default()
        .semaphore(submission.image_acquired)
        .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);

    let signal_infos = [
        vk::SemaphoreSubmitInfo::default()
            .semaphore(submission.render_complete)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS),
        vk::SemaphoreSubmitInfo::default()
            .semaphore(submission.timeline)
            .value(submission.timeline_value)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS),
    ];

    let submit_info = vk::SubmitInfo2::default()
        .command_buffer_infos(std::slice::from_ref(&command_buffer_info))
        .wait_semaphore_infos(std::slice::from_ref(&wait_info))
        .signal_semaphore_infos(&signal_infos);

    device.queue_submit2(queue, std::slice::from_ref(&submit_info), vk::Fence::null())?;
    Ok(())
}
