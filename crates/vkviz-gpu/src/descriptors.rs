//! Descriptor pool allocator.
//!
//! One pool shared by every renderer, sized from per-type ratios of the
//! maximum set count. Sets are never freed individually; the whole pool is
//! reset in bulk or destroyed.

use crate::error::Result;
use ash::vk;
use tracing::debug;

/// Number of descriptors of one type to reserve per descriptor set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self {
            descriptor_type,
            ratio,
        }
    }
}

/// Sizing of the shared descriptor pool.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorAllocatorConfig {
    pub max_sets: u32,
    pub ratios: Vec<PoolSizeRatio>,
}

impl Default for DescriptorAllocatorConfig {
    fn default() -> Self {
        Self {
            max_sets: 128,
            ratios: vec![
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 2.0),
                PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 4.0),
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 4.0),
            ],
        }
    }
}

impl DescriptorAllocatorConfig {
    /// Effective set count; a pool always holds at least one set.
    pub fn effective_max_sets(&self) -> u32 {
        self.max_sets.max(1)
    }

    /// Pool sizes derived from the ratios, each at least one descriptor.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let max_sets = self.effective_max_sets();
        self.ratios
            .iter()
            .map(|r| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let count = (r.ratio * max_sets as f32) as u32;
                vk::DescriptorPoolSize {
                    ty: r.descriptor_type,
                    descriptor_count: count.max(1),
                }
            })
            .collect()
    }
}

/// Single-pool descriptor set allocator.
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

impl DescriptorAllocator {
    /// Create the pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, config: &DescriptorAllocatorConfig) -> Result<Self> {
        let pool_sizes = config.pool_sizes();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(config.effective_max_sets())
            .pool_sizes(&pool_sizes);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        debug!(
            "Descriptor pool created: {} sets, {} types",
            config.effective_max_sets(),
            pool_sizes.len()
        );

        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one descriptor set with the given layout.
    ///
    /// # Safety
    /// The device and layout must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = device.allocate_descriptor_sets(&alloc_info)?;
        Ok(sets[0])
    }

    /// Return every set to the pool.
    ///
    /// # Safety
    /// No set allocated from this pool may still be in use by the device.
    pub unsafe fn clear(&self, device: &ash::Device) -> Result<()> {
        if self.pool != vk::DescriptorPool::null() {
            device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    /// Destroy the pool. Calling this twice is a no-op.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(self.pool, None);
            self.pool = vk::DescriptorPool::null();
        }
    }
}
