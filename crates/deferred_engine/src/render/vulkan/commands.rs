//! Command pool and one-shot command submission
//!
//! The pool owns its handle and frees every allocated command buffer when
//! dropped. One-shot helpers cover the transfer paths: record a single
//! command buffer, submit it, wait for the queue to idle, and free it.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool for the given queue family.
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers from this pool.
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // All command buffers must be out of flight before the pool goes
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Allocate and begin a one-time-submit command buffer.
pub fn begin_one_shot(
    device: &Device,
    command_pool: vk::CommandPool,
) -> VulkanResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = unsafe {
        device
            .allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::Api)?[0]
    };

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(VulkanError::Api)?;
    }

    Ok(command_buffer)
}

/// End, submit, and wait out a one-shot command buffer, then free it.
pub fn submit_one_shot(
    device: &Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
) -> VulkanResult<()> {
    unsafe {
        device
            .end_command_buffer(command_buffer)
            .map_err(VulkanError::Api)?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        let result = device
            .queue_submit(queue, &[submit_info], vk::Fence::null())
            .map_err(VulkanError::Api)
            .and_then(|_| device.queue_wait_idle(queue).map_err(VulkanError::Api));

        device.free_command_buffers(command_pool, &command_buffers);

        result
    }
}
