// Synchronization primitives
//
// Fences and command buffers as the pool sees them. Fences signal GPU -> CPU
// completion of one submission; the pool decides when a buffer may be
// reused based on them.

use anyhow::{Context, Result};
use ash::vk;

use crate::gfx::pool::CommandAllocator;
use crate::gfx::GfxError;

/// Native side of one queue's command buffer pool.
pub struct VulkanCommands {
    device: ash::Device,
    pool: vk::CommandPool,
    /// `None` waits forever.
    timeout_ms: Option<u64>,
}

impl VulkanCommands {
    pub fn new(device: &ash::Device, family: u32, timeout_ms: Option<u64>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(family)
            // RESET: pooled buffers are reset one by one before reuse
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .with_context(|| format!("Failed to create command pool for family {}", family))?;

        Ok(Self {
            device: device.clone(),
            pool,
            timeout_ms,
        })
    }

    /// Destroy the native pool. Frees every buffer allocated from it.
    ///
    /// # Safety
    /// No buffer from this pool may be pending execution or used afterwards.
    pub unsafe fn destroy(&self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }

    fn timeout_ns(&self) -> u64 {
        match self.timeout_ms {
            Some(ms) => ms.saturating_mul(1_000_000),
            None => u64::MAX,
        }
    }
}

impl CommandAllocator for VulkanCommands {
    type Buffer = vk::CommandBuffer;
    type Fence = vk::Fence;

    fn allocate_buffer(&self) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?;
        buffers
            .into_iter()
            .next()
            .context("Driver returned no command buffer")
    }

    fn reset_buffer(&self, buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
        }
        .context("Failed to reset command buffer")
    }

    fn free_buffers(&self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(self.pool, buffers) };
    }

    fn create_fence(&self) -> Result<vk::Fence> {
        // Unsignaled: it signals when the submission it guards completes
        let fence_info = vk::FenceCreateInfo::builder();
        unsafe { self.device.create_fence(&fence_info, None) }.context("Failed to create fence")
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        unsafe { self.device.reset_fences(fences) }.context("Failed to reset fences")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool> {
        unsafe { self.device.get_fence_status(fence) }.context("Failed to query fence status")
    }

    fn wait_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        match unsafe { self.device.wait_for_fences(fences, true, self.timeout_ns()) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                Err(GfxError::FenceTimeout(self.timeout_ms.unwrap_or(u64::MAX)).into())
            }
            Err(e) => Err(GfxError::Vulkan(e)).context("Failed to wait for fences"),
        }
    }
}
