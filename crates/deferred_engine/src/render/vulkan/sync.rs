//! Frame synchronization primitives
//!
//! One `FrameSync` triple per frame-in-flight slot: a semaphore signaled
//! when the swapchain image is available, a semaphore signaled when
//! rendering finishes, and a fence the CPU waits on before reusing the
//! slot. Fences are created signaled so the first wait on each slot
//! returns immediately.

use ash::{vk, Device};

use crate::config::MAX_FRAME_DRAWS;

use super::{VulkanError, VulkanResult};

/// Advance a frame-slot index, wrapping at the frames-in-flight limit.
pub fn next_frame_slot(current: usize) -> usize {
    (current + 1) % MAX_FRAME_DRAWS
}

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until the fence signals. The wait is unbounded; a device hang
    /// surfaces here as a hang rather than a timeout error.
    pub fn wait(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects for one frame-in-flight slot
pub struct FrameSync {
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Signaled so the first frame's wait passes immediately
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Create one sync triple per frame-in-flight slot.
    pub fn per_frame(device: &Device) -> VulkanResult<Vec<Self>> {
        (0..MAX_FRAME_DRAWS)
            .map(|_| Self::new(device.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_slots_cycle_through_both_slots() {
        let mut slot = 0;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(slot);
            slot = next_frame_slot(slot);
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn slot_never_leaves_range() {
        let mut slot = 0;
        for _ in 0..100 {
            slot = next_frame_slot(slot);
            assert!(slot < MAX_FRAME_DRAWS);
        }
    }
}
