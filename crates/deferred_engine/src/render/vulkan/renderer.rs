//! The deferred frame engine
//!
//! Owns every Vulkan resource from context to pipelines and drives the
//! per-frame loop: wait on the frame slot's fence, acquire a swapchain
//! image, refresh uniforms, record the two-subpass command buffer, submit,
//! present, and advance the slot. Teardown is RAII: fields are declared in
//! the order they must be destroyed, dependents first, context last.

use ash::vk;
use nalgebra::Matrix4;

use crate::config::{RendererConfig, MAX_FRAME_DRAWS, MAX_OBJECTS};
use crate::render::camera::Camera;
use crate::render::mesh::{Mesh, MeshData, Model};

use super::buffer::align_up;
use super::commands::CommandPool;
use super::context::VulkanContext;
use super::framebuffer::Framebuffers;
use super::image::{choose_supported_format, DeviceImage};
use super::pipeline::{
    build_pipeline, plan_draw_bindings, GraphicsPipeline, PipelineConfig, PipelineManager,
    PushModel, UboModel, UboViewProjection,
};
use super::render_pass::RenderPass;
use super::shader::ShaderModule;
use super::swapchain::Swapchain;
use super::sync::{next_frame_slot, FrameSync};
use super::texture::{Texture, TextureManager};
use super::window::Window;
use super::{VulkanError, VulkanResult};

const GEOMETRY_VERT: &str = "geometry_vert";
const GEOMETRY_FRAG: &str = "geometry_frag";
const COMPOSITION_VERT: &str = "composition_vert";
const COMPOSITION_FRAG: &str = "composition_frag";

/// Intermediate render targets recreated with the swapchain.
struct RenderTargets {
    colour: DeviceImage,
    normal: DeviceImage,
    depth: DeviceImage,
}

impl RenderTargets {
    fn new(context: &VulkanContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let instance = &context.instance.instance;
        let physical = context.physical_device.device;
        let device = context.raw_device();

        let colour_format = choose_supported_format(
            instance,
            physical,
            &[vk::Format::R8G8B8A8_UNORM],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::COLOR_ATTACHMENT,
            "colour intermediate",
        )?;
        let normal_format = choose_supported_format(
            instance,
            physical,
            &[
                vk::Format::R16G16B16A16_SFLOAT,
                vk::Format::R8G8B8A8_UNORM,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::COLOR_ATTACHMENT,
            "normal intermediate",
        )?;
        let depth_format = choose_supported_format(
            instance,
            physical,
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth",
        )?;

        let colour = DeviceImage::new(
            device.clone(),
            instance,
            physical,
            extent,
            1,
            colour_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )?;
        let normal = DeviceImage::new(
            device.clone(),
            instance,
            physical,
            extent,
            1,
            normal_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )?;
        let depth = DeviceImage::new(
            device,
            instance,
            physical,
            extent,
            1,
            depth_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?;

        Ok(Self {
            colour,
            normal,
            depth,
        })
    }
}

/// The deferred renderer. Declaration order is teardown order.
pub struct VulkanRenderer {
    models: Vec<Model>,
    texture_manager: TextureManager,
    geometry_pipeline: GraphicsPipeline,
    composition_pipeline: GraphicsPipeline,
    pipeline_manager: PipelineManager,
    frame_syncs: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
    framebuffers: Framebuffers,
    render_targets: RenderTargets,
    render_pass: RenderPass,
    swapchain: Swapchain,
    camera: Camera,
    config: RendererConfig,
    current_frame: usize,
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Initialize the full rendering stack for a window.
    pub fn new(window: &mut Window, config: RendererConfig) -> VulkanResult<Self> {
        let context = VulkanContext::new(
            window,
            &config.application_name,
            config.enable_validation,
        )?;
        let device = context.raw_device();

        let (fb_width, fb_height) = window.get_framebuffer_size();
        let swapchain = Swapchain::new(
            &context.instance.instance,
            device.clone(),
            context.surface,
            &context.surface_loader,
            &context.physical_device,
            vk::Extent2D {
                width: fb_width,
                height: fb_height,
            },
            vk::SwapchainKHR::null(),
        )?;
        let extent = swapchain.extent();

        let render_targets = RenderTargets::new(&context, extent)?;

        let render_pass = RenderPass::new(
            device.clone(),
            swapchain.format(),
            render_targets.colour.format(),
            render_targets.normal.format(),
            render_targets.depth.format(),
        )?;

        let framebuffers = Framebuffers::new(
            device.clone(),
            render_pass.handle(),
            swapchain.image_views(),
            render_targets.colour.view(),
            render_targets.normal.view(),
            render_targets.depth.view(),
            extent,
        )?;

        let command_pool = CommandPool::new(device.clone(), context.device.graphics_family)?;
        let command_buffers =
            command_pool.allocate_command_buffers(swapchain.image_count() as u32)?;

        let mut pipeline_manager = PipelineManager::new(
            device.clone(),
            &context.instance.instance,
            context.physical_device.device,
            swapchain.image_count(),
            context.physical_device.min_uniform_buffer_offset_alignment(),
        )?;
        pipeline_manager.write_input_sets(
            render_targets.colour.view(),
            render_targets.normal.view(),
            render_targets.depth.view(),
        );

        let (geometry_pipeline, composition_pipeline) = Self::build_pipelines(
            &device,
            &config,
            render_pass.handle(),
            extent,
            &pipeline_manager,
        )?;

        let frame_syncs = FrameSync::per_frame(&device)?;

        let texture_manager = TextureManager::new(
            device,
            &context.instance.instance,
            context.physical_device.device,
            command_pool.handle(),
            context.graphics_queue(),
        )?;

        // Descriptor set indices stay aligned with the texture registry,
        // starting with the default white texture at 0
        let white = texture_manager
            .get(0)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "default texture missing".to_string(),
            })?;
        pipeline_manager.create_texture_set(white.view(), white.sampler())?;

        let camera = Camera::new(
            nalgebra::Point3::new(0.0, 1.0, 4.0),
            nalgebra::Point3::origin(),
            extent.width as f32 / extent.height.max(1) as f32,
        );

        log::info!(
            "Renderer initialized: {}x{}, {} swapchain images, {} frames in flight",
            extent.width,
            extent.height,
            swapchain.image_count(),
            MAX_FRAME_DRAWS
        );

        Ok(Self {
            models: Vec::new(),
            texture_manager,
            geometry_pipeline,
            composition_pipeline,
            pipeline_manager,
            frame_syncs,
            command_buffers,
            command_pool,
            framebuffers,
            render_targets,
            render_pass,
            swapchain,
            camera,
            config,
            current_frame: 0,
            context,
        })
    }

    fn build_pipelines(
        device: &ash::Device,
        config: &RendererConfig,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        pipeline_manager: &PipelineManager,
    ) -> VulkanResult<(GraphicsPipeline, GraphicsPipeline)> {
        let geometry_vert =
            ShaderModule::from_file(device.clone(), config.shader_path(GEOMETRY_VERT))?;
        let geometry_frag =
            ShaderModule::from_file(device.clone(), config.shader_path(GEOMETRY_FRAG))?;
        let composition_vert =
            ShaderModule::from_file(device.clone(), config.shader_path(COMPOSITION_VERT))?;
        let composition_frag =
            ShaderModule::from_file(device.clone(), config.shader_path(COMPOSITION_FRAG))?;

        let geometry_layouts = pipeline_manager.geometry_set_layouts();
        let composition_layouts = pipeline_manager.composition_set_layouts();

        let geometry_pipeline = build_pipeline(
            device.clone(),
            render_pass,
            extent,
            PipelineConfig::Geometry {
                vertex_shader: &geometry_vert,
                fragment_shader: &geometry_frag,
                set_layouts: &geometry_layouts,
            },
        )?;
        let composition_pipeline = build_pipeline(
            device.clone(),
            render_pass,
            extent,
            PipelineConfig::Composition {
                vertex_shader: &composition_vert,
                fragment_shader: &composition_frag,
                set_layouts: &composition_layouts,
            },
        )?;

        // Shader modules are no longer needed once the pipelines exist
        Ok((geometry_pipeline, composition_pipeline))
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Load a texture from RGBA8 pixels and register it, returning its id.
    pub fn load_texture(&mut self, width: u32, height: u32, pixels: &[u8]) -> VulkanResult<usize> {
        let texture = Texture::from_rgba8(
            self.context.raw_device(),
            &self.context.instance.instance,
            self.context.physical_device.device,
            self.command_pool.handle(),
            self.context.graphics_queue(),
            width,
            height,
            pixels,
        )?;

        let id = self.texture_manager.add(texture)?;
        let texture = self
            .texture_manager
            .get(id)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "texture vanished after registration".to_string(),
            })?;
        let set_id = self
            .pipeline_manager
            .create_texture_set(texture.view(), texture.sampler())?;
        debug_assert_eq!(id, set_id);

        Ok(id)
    }

    /// Upload a model's meshes and take ownership of it.
    pub fn add_model(&mut self, mesh_data: &[MeshData]) -> VulkanResult<usize> {
        let total_meshes: usize =
            self.models.iter().map(Model::mesh_count).sum::<usize>() + mesh_data.len();
        if total_meshes > MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "scene meshes",
                limit: MAX_OBJECTS,
            });
        }

        let meshes = mesh_data
            .iter()
            .map(|data| {
                Mesh::new(
                    self.context.raw_device(),
                    &self.context.instance.instance,
                    self.context.physical_device.device,
                    self.command_pool.handle(),
                    self.context.graphics_queue(),
                    data,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        self.models.push(Model::new(meshes));
        Ok(self.models.len() - 1)
    }

    pub fn model_mut(&mut self, index: usize) -> Option<&mut Model> {
        self.models.get_mut(index)
    }

    /// Render one frame.
    pub fn draw(&mut self, window: &mut Window) -> VulkanResult<()> {
        // 1. Wait for this slot's previous frame to finish
        let sync = &self.frame_syncs[self.current_frame];
        sync.in_flight.wait()?;

        // 2. Acquire a swapchain image
        let acquire_result = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        };
        let image_index = match acquire_result {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                return self.recreate_swapchain(window);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        // 3. The slot is committed now; reset its fence
        self.frame_syncs[self.current_frame].in_flight.reset()?;

        // 4. Refresh uniforms for this image
        self.update_uniforms(image_index as usize)?;

        // 5. Record the command buffer
        self.record_commands(image_index as usize)?;

        // 6. Submit, signaling the fence for this slot
        let sync = &self.frame_syncs[self.current_frame];
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [self.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context
                .device
                .device
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info],
                    sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        // 7. Present
        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.context.present_queue(), &present_info)
        };

        let needs_recreate = match present_result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(VulkanError::Api(e)),
        };

        if needs_recreate || window.take_framebuffer_resized() {
            self.recreate_swapchain(window)?;
        }

        self.current_frame = next_frame_slot(self.current_frame);
        Ok(())
    }

    /// Upload view-projection and all mesh model matrices for one image.
    fn update_uniforms(&mut self, image_index: usize) -> VulkanResult<()> {
        let vp = UboViewProjection {
            projection: self.camera.projection_matrix().into(),
            view: self.camera.view_matrix().into(),
        };
        self.pipeline_manager
            .update_view_projection(image_index, &vp)?;

        // Flat mesh ordinal across all models, matching the draw order
        let mut ordinal = 0usize;
        for model_index in 0..self.models.len() {
            for mesh_index in 0..self.models[model_index].mesh_count() {
                let world: Matrix4<f32> =
                    self.models[model_index].mesh_world_transform(mesh_index);
                self.pipeline_manager
                    .transfer_space_mut()
                    .set(ordinal, &UboModel {
                        model: world.into(),
                    })?;
                ordinal += 1;
            }
        }

        self.pipeline_manager
            .upload_model_transforms(image_index, ordinal)
    }

    /// Record the two-subpass command buffer for one swapchain image.
    fn record_commands(&mut self, image_index: usize) -> VulkanResult<()> {
        let device = &self.context.device.device;
        let command_buffer = self.command_buffers[image_index];
        let extent = self.swapchain.extent();

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;

            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                },
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                },
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            ];

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.handle())
                .framebuffer(self.framebuffers.get(image_index))
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );

            // Subpass 0: geometry
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.geometry_pipeline.handle(),
            );

            let texture_ids: Vec<usize> = self
                .models
                .iter()
                .flat_map(|model| model.meshes().iter().map(Mesh::texture_id))
                .collect();
            let bindings = plan_draw_bindings(
                &texture_ids,
                self.pipeline_manager.transfer_space().stride(),
            );

            let meshes: Vec<(usize, usize)> = self
                .models
                .iter()
                .enumerate()
                .flat_map(|(mi, model)| (0..model.mesh_count()).map(move |si| (mi, si)))
                .collect();

            for (binding, &(model_index, mesh_index)) in bindings.iter().zip(meshes.iter()) {
                let model = &self.models[model_index];
                let mesh = &model.meshes()[mesh_index];

                device.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    &[mesh.vertex_buffer()],
                    &[0],
                );
                device.cmd_bind_index_buffer(
                    command_buffer,
                    mesh.index_buffer(),
                    0,
                    vk::IndexType::UINT32,
                );

                let world: Matrix4<f32> = model.mesh_world_transform(mesh_index);
                let push = PushModel {
                    model: world.into(),
                };
                device.cmd_push_constants(
                    command_buffer,
                    self.geometry_pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );

                let sets = [
                    self.pipeline_manager.uniform_set(image_index),
                    self.pipeline_manager.texture_set(binding.texture_id)?,
                ];
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.geometry_pipeline.layout(),
                    0,
                    &sets,
                    &[binding.dynamic_offset],
                );

                device.cmd_draw_indexed(command_buffer, mesh.index_count(), 1, 0, 0, 0);
            }

            // Subpass 1: composition over a full-screen triangle
            device.cmd_next_subpass(command_buffer, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.composition_pipeline.handle(),
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.composition_pipeline.layout(),
                0,
                &[self.pipeline_manager.input_set(image_index)],
                &[],
            );
            device.cmd_draw(command_buffer, 3, 1, 0, 0);

            device.cmd_end_render_pass(command_buffer);
            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }

    /// Rebuild everything that depends on the swapchain after a resize or
    /// an out-of-date result.
    fn recreate_swapchain(&mut self, window: &mut Window) -> VulkanResult<()> {
        let (fb_width, fb_height) = window.get_framebuffer_size();
        if fb_width == 0 || fb_height == 0 {
            // Minimized; try again once the window has an area
            return Ok(());
        }

        unsafe {
            self.context
                .device
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)?;
        }

        let device = self.context.raw_device();

        let new_swapchain = Swapchain::new(
            &self.context.instance.instance,
            device.clone(),
            self.context.surface,
            &self.context.surface_loader,
            &self.context.physical_device,
            vk::Extent2D {
                width: fb_width,
                height: fb_height,
            },
            self.swapchain.handle(),
        )?;
        ensure_image_count_unchanged(self.swapchain.image_count(), new_swapchain.image_count())?;
        let extent = new_swapchain.extent();

        let render_targets = RenderTargets::new(&self.context, extent)?;

        let framebuffers = Framebuffers::new(
            device.clone(),
            self.render_pass.handle(),
            new_swapchain.image_views(),
            render_targets.colour.view(),
            render_targets.normal.view(),
            render_targets.depth.view(),
            extent,
        )?;

        let (geometry_pipeline, composition_pipeline) = Self::build_pipelines(
            &device,
            &self.config,
            self.render_pass.handle(),
            extent,
            &self.pipeline_manager,
        )?;

        self.pipeline_manager.write_input_sets(
            render_targets.colour.view(),
            render_targets.normal.view(),
            render_targets.depth.view(),
        );

        // Old resources drop as they are replaced; the device is idle
        self.framebuffers = framebuffers;
        self.render_targets = render_targets;
        self.swapchain = new_swapchain;
        self.geometry_pipeline = geometry_pipeline;
        self.composition_pipeline = composition_pipeline;

        self.camera
            .set_aspect(extent.width as f32 / extent.height.max(1) as f32);

        log::info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Block until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.context
                .device
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }

    /// The dynamic uniform stride for this device, useful for diagnostics.
    pub fn model_uniform_stride(&self) -> u64 {
        align_up(
            std::mem::size_of::<UboModel>() as u64,
            self.context
                .physical_device
                .min_uniform_buffer_offset_alignment(),
        )
    }
}

/// Command buffers and the per-image descriptor sets are sized once at
/// startup, so a recreated swapchain must keep the same image count.
/// Indexing them with a larger count would read past the end.
fn ensure_image_count_unchanged(previous: usize, current: usize) -> VulkanResult<()> {
    if previous != current {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "swapchain image count changed from {} to {} on recreation",
                previous, current
            ),
        });
    }
    Ok(())
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // Nothing may be destroyed while in flight
        let _ = self.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_change_on_recreation_is_rejected() {
        assert!(ensure_image_count_unchanged(3, 3).is_ok());
        let result = ensure_image_count_unchanged(3, 4);
        assert!(matches!(
            result,
            Err(VulkanError::InvalidOperation { .. })
        ));
    }
}
