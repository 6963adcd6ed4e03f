//! Deferred render pass construction
//!
//! One render pass with two subpasses. The geometry subpass renders scene
//! meshes into intermediate colour, normal, and depth attachments. The
//! composition subpass reads those three as input attachments and writes
//! the lit result to the swapchain image with a full-screen pass.
//!
//! Attachment indices:
//!   0  swapchain colour (presented)
//!   1  intermediate colour
//!   2  intermediate normal
//!   3  depth

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Attachment index of the swapchain image.
pub const ATTACHMENT_SWAPCHAIN: u32 = 0;
/// Attachment index of the intermediate colour target.
pub const ATTACHMENT_COLOUR: u32 = 1;
/// Attachment index of the intermediate normal target.
pub const ATTACHMENT_NORMAL: u32 = 2;
/// Attachment index of the depth target.
pub const ATTACHMENT_DEPTH: u32 = 3;

/// Subpass index for geometry rendering.
pub const SUBPASS_GEOMETRY: u32 = 0;
/// Subpass index for deferred composition.
pub const SUBPASS_COMPOSITION: u32 = 1;

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Build the two-subpass deferred render pass.
    pub fn new(
        device: Device,
        swapchain_format: vk::Format,
        colour_format: vk::Format,
        normal_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        // Presented image: cleared, kept for presentation
        let swapchain_attachment = vk::AttachmentDescription::builder()
            .format(swapchain_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        // Intermediates live only within the pass, so their contents need
        // not survive it
        let colour_attachment = vk::AttachmentDescription::builder()
            .format(colour_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let normal_attachment = vk::AttachmentDescription::builder()
            .format(normal_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let attachments = [
            swapchain_attachment,
            colour_attachment,
            normal_attachment,
            depth_attachment,
        ];

        // Subpass 0: geometry into colour + normal, depth testing on
        let geometry_colour_refs = [
            vk::AttachmentReference {
                attachment: ATTACHMENT_COLOUR,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
            vk::AttachmentReference {
                attachment: ATTACHMENT_NORMAL,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
        ];
        let geometry_depth_ref = vk::AttachmentReference {
            attachment: ATTACHMENT_DEPTH,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let geometry_subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&geometry_colour_refs)
            .depth_stencil_attachment(&geometry_depth_ref)
            .build();

        // Subpass 1: composition reads the intermediates, writes swapchain
        let composition_colour_refs = [vk::AttachmentReference {
            attachment: ATTACHMENT_SWAPCHAIN,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let composition_input_refs = [
            vk::AttachmentReference {
                attachment: ATTACHMENT_COLOUR,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
            vk::AttachmentReference {
                attachment: ATTACHMENT_NORMAL,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
            vk::AttachmentReference {
                attachment: ATTACHMENT_DEPTH,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        ];

        let composition_subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&composition_colour_refs)
            .input_attachments(&composition_input_refs)
            .build();

        let subpasses = [geometry_subpass, composition_subpass];

        // External work must finish before subpass 0 writes; subpass 0
        // writes must be visible as shader reads in subpass 1; subpass 1
        // must finish before presentation reads the swapchain image.
        let dependencies = [
            vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: SUBPASS_GEOMETRY,
                src_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                src_access_mask: vk::AccessFlags::MEMORY_READ,
                dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            },
            vk::SubpassDependency {
                src_subpass: SUBPASS_GEOMETRY,
                dst_subpass: SUBPASS_COMPOSITION,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_access_mask: vk::AccessFlags::INPUT_ATTACHMENT_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            },
            vk::SubpassDependency {
                src_subpass: SUBPASS_COMPOSITION,
                dst_subpass: vk::SUBPASS_EXTERNAL,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access_mask: vk::AccessFlags::MEMORY_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            },
        ];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Render pass created with 2 subpasses, 4 attachments");

        Ok(Self {
            device,
            render_pass,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
