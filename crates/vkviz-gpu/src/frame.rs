//! Frame slot ring.
//!
//! Each slot owns the host-side resources one in-flight frame records
//! into: a command pool with one primary buffer, the image-acquired and
//! render-complete binary semaphores, and a deletion queue for anything
//! scoped to the slot. Slots rotate by `frame_number % slot_count`.

use crate::command::CommandPool;
use crate::deferred::DeletionQueue;
use crate::error::{GpuError, Result};
use crate::sync::create_semaphore;
use ash::vk;
use std::sync::Arc;
use tracing::debug;

/// Image-acquired semaphores abandoned by suboptimal acquires.
///
/// They stay signaled with nothing left to wait on them, so they can only be
/// destroyed once the device is idle.
#[derive(Debug, Default)]
pub struct RetiredSemaphores {
    semaphores: Vec<vk::Semaphore>,
}

impl RetiredSemaphores {
    pub fn retire(&mut self, semaphore: vk::Semaphore) {
        self.semaphores.push(semaphore);
    }

    pub fn len(&self) -> usize {
        self.semaphores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.semaphores.is_empty()
    }

    /// Hand every retired semaphore to `destroy` and forget it.
    pub fn release(&mut self, mut destroy: impl FnMut(vk::Semaphore)) -> usize {
        let count = self.semaphores.len();
        for semaphore in self.semaphores.drain(..) {
            destroy(semaphore);
        }
        count
    }
}

/// Per-slot recording and synchronization resources.
pub struct FrameSlot {
    device: Arc<ash::Device>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    image_acquired: vk::Semaphore,
    render_complete: vk::Semaphore,
    retired: RetiredSemaphores,
    deletion_queue: DeletionQueue,
}

impl FrameSlot {
    /// Create a slot whose command buffer can be reset individually.
    ///
    /// # Safety
    /// The device must be valid and `queue_family` must exist.
    pub unsafe fn new(device: &Arc<ash::Device>, queue_family: u32) -> Result<Self> {
        let mut deletion_queue = DeletionQueue::new();

        match Self::create_resources(device, queue_family, &mut deletion_queue) {
            Ok((command_pool, command_buffer, image_acquired, render_complete)) => Ok(Self {
                device: Arc::clone(device),
                command_pool,
                command_buffer,
                image_acquired,
                render_complete,
                retired: RetiredSemaphores::default(),
                deletion_queue,
            }),
            Err(e) => {
                deletion_queue.flush();
                Err(e)
            }
        }
    }

    unsafe fn create_resources(
        device: &Arc<ash::Device>,
        queue_family: u32,
        deletion_queue: &mut DeletionQueue,
    ) -> Result<(vk::CommandPool, vk::CommandBuffer, vk::Semaphore, vk::Semaphore)> {
        let pool = CommandPool::new(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        {
            let device = Arc::clone(device);
            let pool = pool.handle();
            deletion_queue.push(move || unsafe { device.destroy_command_pool(pool, None) });
        }
        let command_buffer = pool.allocate_primary(device)?;

        let render_complete = create_semaphore(device)?;
        defer_semaphore(deletion_queue, device, render_complete);
        // Owned directly since recycling replaces it; created last so a
        // failure leaves nothing outside the queue.
        let image_acquired = create_semaphore(device)?;

        Ok((pool.handle(), command_buffer, image_acquired, render_complete))
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired
    }

    pub fn render_complete(&self) -> vk::Semaphore {
        self.render_complete
    }

    /// Register a cleanup action scoped to this slot.
    pub fn defer(&mut self, action: impl FnOnce() + Send + 'static) {
        self.deletion_queue.push(action);
    }

    /// Replace the image-acquired semaphore with a fresh one.
    ///
    /// A suboptimal acquire signals the semaphore even though the frame is
    /// abandoned, so it can no longer be handed to the next acquire. The old
    /// semaphore is retired until [`FrameSlot::release_retired`].
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn recycle_image_acquired(&mut self) -> Result<()> {
        let replacement = create_semaphore(&self.device)?;
        self.retired.retire(self.image_acquired);
        self.image_acquired = replacement;
        Ok(())
    }

    /// Semaphores waiting for [`FrameSlot::release_retired`].
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Destroy the retired image-acquired semaphores.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn release_retired(&mut self) -> usize {
        let device = &self.device;
        self.retired
            .release(|semaphore| device.destroy_semaphore(semaphore, None))
    }

    /// Destroy everything the slot owns. Safe to call twice.
    ///
    /// # Safety
    /// The device must be idle with respect to this slot's submissions.
    pub unsafe fn destroy(&mut self) {
        self.release_retired();
        if self.image_acquired != vk::Semaphore::null() {
            self.device.destroy_semaphore(self.image_acquired, None);
        }
        self.deletion_queue.flush();
        self.command_buffer = vk::CommandBuffer::null();
        self.command_pool = vk::CommandPool::null();
        self.image_acquired = vk::Semaphore::null();
        self.render_complete = vk::Semaphore::null();
    }
}

fn defer_semaphore(queue: &mut DeletionQueue, device: &Arc<ash::Device>, semaphore: vk::Semaphore) {
    let device = Arc::clone(device);
    queue.push(move || unsafe { device.destroy_semaphore(semaphore, None) });
}

/// Fixed-size ring of frame slots.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
}

impl FrameRing {
    /// Create `slot_count` slots (at least one).
    ///
    /// # Safety
    /// The device must be valid and `queue_family` must exist.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        queue_family: u32,
        slot_count: usize,
    ) -> Result<Self> {
        let slot_count = slot_count.max(1);
        let mut slots: Vec<FrameSlot> = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            match FrameSlot::new(device, queue_family) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in slots.iter_mut().rev() {
                        slot.destroy();
                    }
                    return Err(e);
                }
            }
        }
        debug!("Created {} frame slots", slot_count);

        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Result<&FrameSlot> {
        self.slots
            .get(index)
            .ok_or_else(|| GpuError::InvalidState(format!("No frame slot {index}")))
    }

    pub fn slot_mut(&mut self, index: usize) -> Result<&mut FrameSlot> {
        self.slots
            .get_mut(index)
            .ok_or_else(|| GpuError::InvalidState(format!("No frame slot {index}")))
    }

    /// Destroy the retired semaphores of every slot.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn release_retired(&mut self) -> usize {
        let released: usize = self
            .slots
            .iter_mut()
            .map(|slot| slot.release_retired())
            .sum();
        if released > 0 {
            debug!("Released {} retired semaphores", released);
        }
        released
    }

    /// Destroy every slot, last slot first. Safe to call twice.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self) {
        for slot in self.slots.iter_mut().rev() {
            slot.destroy();
        }
    }
}
