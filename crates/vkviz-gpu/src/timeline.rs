//! Timeline synchronization core.
//!
//! One monotonically increasing counter backed by one timeline semaphore
//! replaces per-frame fences. Every submission signals the next counter
//! value and that value is recorded against the frame slot that submitted
//! it. Before a slot is reused, the control thread waits until the device
//! has reached the slot's recorded value, which bounds the number of frames
//! in flight to the number of slots.

use crate::error::Result;
use ash::vk;

/// Host-side bookkeeping for the timeline counter.
///
/// Device access is injected through closures so the ordering rules can be
/// driven without a GPU.
#[derive(Debug, Clone)]
pub struct FrameTimeline {
    value: u64,
    slot_values: Vec<u64>,
}

impl FrameTimeline {
    /// Create bookkeeping for `slot_count` slots (at least one).
    pub fn new(slot_count: usize) -> Self {
        Self {
            value: 0,
            slot_values: vec![0; slot_count.max(1)],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_values.len()
    }

    /// Slot that records frame `frame_number`.
    pub fn slot_for_frame(&self, frame_number: u64) -> usize {
        // Slot counts are tiny, the cast back cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        let slot = (frame_number % self.slot_values.len() as u64) as usize;
        slot
    }

    /// Last value handed to a submission (0 before the first one).
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Value `slot` was last submitted with, 0 if never submitted, or
    /// `None` if the ring has no such slot.
    pub fn slot_value(&self, slot: usize) -> Option<u64> {
        self.slot_values.get(slot).copied()
    }

    /// Value the device must reach before `slot` may be reused.
    pub fn reuse_target(&self, slot: usize) -> Option<u64> {
        self.slot_value(slot).filter(|&value| value != 0)
    }

    /// Block until `slot` may be reused.
    ///
    /// `wait` is called with the slot's recorded value; it is not called at
    /// all for a slot that has never been submitted.
    pub fn wait_for_slot_reuse<E>(
        &self,
        slot: usize,
        wait: impl FnOnce(u64) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        match self.reuse_target(slot) {
            Some(value) => wait(value),
            None => Ok(()),
        }
    }

    /// Submit work for `slot` that signals the next counter value.
    ///
    /// `submit` receives the value to signal. The counter and the slot's
    /// record only advance when it succeeds. Slots outside the ring are
    /// never recorded.
    pub fn submit<E>(
        &mut self,
        slot: usize,
        submit: impl FnOnce(u64) -> std::result::Result<(), E>,
    ) -> std::result::Result<u64, E> {
        let value = self.value + 1;
        submit(value)?;
        self.value = value;
        if let Some(recorded) = self.slot_values.get_mut(slot) {
            *recorded = value;
        }
        Ok(value)
    }
}

/// A timeline-type semaphore.
pub struct TimelineSemaphore {
    semaphore: vk::Semaphore,
}

impl TimelineSemaphore {
    /// Create a timeline semaphore starting at zero.
    ///
    /// # Safety
    /// The device must be valid and have the timeline semaphore feature enabled.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = device.create_semaphore(&create_info, None)?;
        Ok(Self { semaphore })
    }

    /// Get the raw semaphore handle.
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Block until the device has signaled at least `value`. No timeout.
    ///
    /// # Safety
    /// The device must be valid.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn wait(&self, device: &ash::Device, value: u64) -> Result<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        device.wait_semaphores(&wait_info, u64::MAX)?;
        Ok(())
    }

    /// Current counter value as observed by the device.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn value(&self, device: &ash::Device) -> Result<u64> {
        Ok(device.get_semaphore_counter_value(self.semaphore)?)
    }

    /// Destroy the semaphore.
    ///
    /// # Safety
    /// No pending submission may reference the semaphore.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.semaphore, None);
    }
}
