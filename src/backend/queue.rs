// Vulkan queue and command buffers
//
// One VulkanQueue per distinct queue family. Each owns a native command
// pool and the fence-keyed cache in front of it. Command buffers keep the
// queue's shared state alive, so a list can never outlive the pool it was
// allocated from.

use anyhow::{Context, Result};
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

use super::device::LogicalDevice;
use super::sync::VulkanCommands;
use crate::core::Ref;
use crate::gfx::pool::{self, CommandBufferPool, PoolStats, PooledList};
use crate::gfx::{CommandList, CommandQueue, GfxError, QueueFlags};

struct QueueShared {
    device: Ref<LogicalDevice>,
    queue: vk::Queue,
    family: u32,
    usage: QueueFlags,
    commands: VulkanCommands,
    // Held across vkQueueSubmit too, which needs external synchronization
    pool: Mutex<CommandBufferPool<VulkanCommands>>,
}

impl Drop for QueueShared {
    fn drop(&mut self) {
        log::debug!("Destroying queue for family {} ({:?})", self.family, self.usage);

        unsafe {
            if let Err(e) = self.device.raw().queue_wait_idle(self.queue) {
                log::error!("Failed to wait on queue family {}: {}", self.family, e);
            }

            self.pool.get_mut().reset(&self.commands);
            self.commands.destroy();
        }
    }
}

/// Execution channel for one queue family.
pub struct VulkanQueue {
    shared: Arc<QueueShared>,
}

impl VulkanQueue {
    pub fn new(
        device: Ref<LogicalDevice>,
        family: u32,
        usage: QueueFlags,
        timeout_ms: Option<u64>,
    ) -> Result<Self> {
        let queue = unsafe { device.raw().get_device_queue(family, 0) };
        let commands = VulkanCommands::new(device.raw(), family, timeout_ms)?;

        log::info!("Queue created: family {} serving {:?}", family, usage);

        Ok(Self {
            shared: Arc::new(QueueShared {
                device,
                queue,
                family,
                usage,
                commands,
                pool: Mutex::new(CommandBufferPool::new()),
            }),
        })
    }

    pub fn family(&self) -> u32 {
        self.shared.family
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.pool.lock().stats()
    }
}

impl CommandQueue for VulkanQueue {
    type List = VulkanCommandBuffer;

    fn usage(&self) -> QueueFlags {
        self.shared.usage
    }

    fn release(&self) -> Result<VulkanCommandBuffer> {
        let buffer = self.shared.pool.lock().acquire(&self.shared.commands)?;

        Ok(VulkanCommandBuffer {
            shared: Arc::clone(&self.shared),
            buffer,
            recording: false,
            recorded: false,
        })
    }

    fn submit(&self, list: VulkanCommandBuffer, wait: bool) -> Result<()> {
        let shared = &self.shared;
        pool::submit(
            &shared.pool,
            &shared.commands,
            shared.family,
            list,
            wait,
            |buffer, fence| {
                let buffers = [buffer];
                let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);

                // The pool lock is held here, serialising access to the queue
                unsafe {
                    shared
                        .device
                        .raw()
                        .queue_submit(shared.queue, &[submit_info.build()], fence)
                }
                .map_err(GfxError::Vulkan)
                .context("Failed to submit command buffer")
            },
        )
    }

    fn wait(&self) -> Result<()> {
        self.shared.pool.lock().wait_all(&self.shared.commands)
    }

    unsafe fn reset_cache(&self) -> Result<()> {
        self.shared.pool.lock().reset(&self.shared.commands);
        Ok(())
    }
}

/// Primary command buffer handed out by a [`VulkanQueue`].
///
/// Dropping a list without submitting it frees its buffer.
pub struct VulkanCommandBuffer {
    shared: Arc<QueueShared>,
    buffer: vk::CommandBuffer,
    recording: bool,
    recorded: bool,
}

impl PooledList for VulkanCommandBuffer {
    type Buffer = vk::CommandBuffer;

    fn family(&self) -> u32 {
        self.shared.family
    }

    fn pool_id(&self) -> usize {
        pool::pool_id(&self.shared.pool)
    }

    fn is_recorded(&self) -> bool {
        self.recorded
    }

    fn into_buffer(mut self) -> vk::CommandBuffer {
        std::mem::replace(&mut self.buffer, vk::CommandBuffer::null())
    }
}

impl CommandList for VulkanCommandBuffer {
    fn is_recording(&self) -> bool {
        self.recording
    }

    fn usage(&self) -> QueueFlags {
        self.shared.usage
    }

    fn begin(&mut self) -> Result<()> {
        if self.recording {
            return Ok(());
        }

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.shared
                .device
                .raw()
                .begin_command_buffer(self.buffer, &begin_info)
        }
        .context("Failed to begin command buffer")?;

        self.recording = true;
        self.recorded = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if !self.recording {
            return Ok(());
        }

        unsafe { self.shared.device.raw().end_command_buffer(self.buffer) }
            .context("Failed to end command buffer")?;

        self.recording = false;
        self.recorded = true;
        Ok(())
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        if self.buffer == vk::CommandBuffer::null() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let buffer = self.buffer;
        pool::abandon(&shared.pool, &shared.commands, self, buffer);
    }
}
