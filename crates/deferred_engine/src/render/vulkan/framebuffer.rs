//! Framebuffers for the deferred render pass
//!
//! One framebuffer per swapchain image, each binding the swapchain view
//! plus the shared intermediate colour, normal, and depth views in the
//! order the render pass declares its attachments.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Framebuffer set with RAII cleanup
pub struct Framebuffers {
    device: Device,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    /// Create one framebuffer per swapchain image view.
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        swapchain_views: &[vk::ImageView],
        colour_view: vk::ImageView,
        normal_view: vk::ImageView,
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let mut framebuffers = Vec::with_capacity(swapchain_views.len());

        for &swapchain_view in swapchain_views {
            // Order matches the render pass attachment indices
            let attachments = [swapchain_view, colour_view, normal_view, depth_view];

            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .create_framebuffer(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            framebuffers.push(framebuffer);
        }

        Ok(Self {
            device,
            framebuffers,
        })
    }

    pub fn get(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
