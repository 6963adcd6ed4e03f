//! Pipeline manager: descriptor machinery and graphics pipelines
//!
//! Owns the descriptor set layouts, the a-priori sized descriptor pools,
//! the per-swapchain-image uniform buffers, the dynamic-uniform transfer
//! block, the texture descriptor registry, and the two graphics pipelines
//! of the deferred pass. Pipelines are built from a tagged
//! [`PipelineConfig`] so the geometry and composition variants share one
//! construction path and differ only in declared state.

use ash::{vk, Device, Instance};
use bytemuck::{Pod, Zeroable};
use std::mem;

use crate::config::MAX_OBJECTS;

use super::buffer::{align_up, Buffer, UniformBuffer};
use super::render_pass::{SUBPASS_COMPOSITION, SUBPASS_GEOMETRY};
use super::shader::ShaderModule;
use super::vertex_layout::Vertex;
use super::{VulkanError, VulkanResult};

/// View and projection matrices, updated once per frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UboViewProjection {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

/// Per-mesh model matrix carried in the dynamic uniform buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UboModel {
    pub model: [[f32; 4]; 4],
}

/// Model matrix pushed per draw; must stay within the 128-byte minimum
/// push constant budget.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PushModel {
    pub model: [[f32; 4]; 4],
}

/// Host-side staging block for the per-mesh dynamic uniforms.
///
/// Entries are spaced by the device's minimum uniform-buffer offset
/// alignment so entry `i` sits exactly at dynamic offset `i * stride`.
pub struct ModelTransferSpace {
    data: Vec<u8>,
    stride: usize,
}

impl ModelTransferSpace {
    pub fn new(min_uniform_offset_alignment: u64) -> Self {
        let stride = align_up(
            mem::size_of::<UboModel>() as u64,
            min_uniform_offset_alignment,
        ) as usize;
        Self {
            data: vec![0u8; stride * MAX_OBJECTS],
            stride,
        }
    }

    /// Aligned size of one entry in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total size of the block in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Store a model matrix at a mesh ordinal.
    pub fn set(&mut self, ordinal: usize, model: &UboModel) -> VulkanResult<()> {
        if ordinal >= MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "model transfer space",
                limit: MAX_OBJECTS,
            });
        }
        let offset = ordinal * self.stride;
        self.data[offset..offset + mem::size_of::<UboModel>()]
            .copy_from_slice(bytemuck::bytes_of(model));
        Ok(())
    }

    /// Read back the matrix at a mesh ordinal.
    pub fn get(&self, ordinal: usize) -> Option<UboModel> {
        if ordinal >= MAX_OBJECTS {
            return None;
        }
        let offset = ordinal * self.stride;
        Some(bytemuck::pod_read_unaligned(
            &self.data[offset..offset + mem::size_of::<UboModel>()],
        ))
    }

    /// The bytes covering the first `count` entries, for upload.
    pub fn bytes_for(&self, count: usize) -> &[u8] {
        &self.data[..count * self.stride]
    }

    /// Dynamic offset for a mesh ordinal.
    pub fn dynamic_offset(&self, ordinal: usize) -> u32 {
        (ordinal * self.stride) as u32
    }
}

/// Bindings for one mesh draw, derived from its position in the flat
/// draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBinding {
    /// Flat ordinal of the mesh across all models
    pub ordinal: usize,
    /// Texture registry index for the sampler descriptor
    pub texture_id: usize,
    /// Byte offset into the dynamic uniform buffer
    pub dynamic_offset: u32,
}

/// Compute the descriptor bindings for a frame's draw list.
///
/// The same ordinals drive both the uniform upload and the bind-time
/// dynamic offsets, so the two can never disagree.
pub fn plan_draw_bindings(texture_ids: &[usize], stride: usize) -> Vec<DrawBinding> {
    texture_ids
        .iter()
        .enumerate()
        .map(|(ordinal, &texture_id)| DrawBinding {
            ordinal,
            texture_id,
            dynamic_offset: (ordinal * stride) as u32,
        })
        .collect()
}

/// Graphics pipeline with its layout, destroyed together.
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Which stage of the deferred pass a pipeline serves.
pub enum PipelineConfig<'a> {
    /// Scene geometry: full vertex input, depth test, two colour outputs
    Geometry {
        vertex_shader: &'a ShaderModule,
        fragment_shader: &'a ShaderModule,
        set_layouts: &'a [vk::DescriptorSetLayout],
    },
    /// Full-screen composition: no vertex input, reads input attachments
    Composition {
        vertex_shader: &'a ShaderModule,
        fragment_shader: &'a ShaderModule,
        set_layouts: &'a [vk::DescriptorSetLayout],
    },
}

/// Build a graphics pipeline for one stage of the deferred pass.
pub fn build_pipeline(
    device: Device,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    config: PipelineConfig<'_>,
) -> VulkanResult<GraphicsPipeline> {
    let entry_name = std::ffi::CStr::from_bytes_with_nul(b"main\0").map_err(|_| {
        VulkanError::InvalidOperation {
            reason: "bad shader entry point name".to_string(),
        }
    })?;

    let (vertex_shader, fragment_shader, set_layouts) = match &config {
        PipelineConfig::Geometry {
            vertex_shader,
            fragment_shader,
            set_layouts,
        }
        | PipelineConfig::Composition {
            vertex_shader,
            fragment_shader,
            set_layouts,
        } => (*vertex_shader, *fragment_shader, *set_layouts),
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader.handle())
            .name(entry_name)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader.handle())
            .name(entry_name)
            .build(),
    ];

    let binding_descriptions = [Vertex::binding_description()];
    let attribute_descriptions = Vertex::attribute_descriptions();

    // Composition consumes no vertex data; its triangle is generated from
    // gl_VertexIndex
    let vertex_input = match &config {
        PipelineConfig::Geometry { .. } => vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions)
            .build(),
        PipelineConfig::Composition { .. } => {
            vk::PipelineVertexInputStateCreateInfo::builder().build()
        }
    };

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    // Geometry writes colour + normal, composition writes the swapchain
    // image only
    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = match &config {
        PipelineConfig::Geometry { .. } => vec![blend_attachment; 2],
        PipelineConfig::Composition { .. } => vec![blend_attachment],
    };

    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let depth_stencil = match &config {
        PipelineConfig::Geometry { .. } => vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .build(),
        PipelineConfig::Composition { .. } => vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .build(),
    };

    let push_constant_ranges = [vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: mem::size_of::<PushModel>() as u32,
    }];

    let layout_info = match &config {
        PipelineConfig::Geometry { .. } => vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges)
            .build(),
        PipelineConfig::Composition { .. } => vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .build(),
    };

    let layout = unsafe {
        device
            .create_pipeline_layout(&layout_info, None)
            .map_err(VulkanError::Api)?
    };

    let subpass = match &config {
        PipelineConfig::Geometry { .. } => SUBPASS_GEOMETRY,
        PipelineConfig::Composition { .. } => SUBPASS_COMPOSITION,
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .depth_stencil_state(&depth_stencil)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(subpass)
        .build();

    let pipeline = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| {
                device.destroy_pipeline_layout(layout, None);
                VulkanError::Api(e)
            })?[0]
    };

    Ok(GraphicsPipeline {
        device,
        pipeline,
        layout,
    })
}

/// Descriptor set layouts, pools, uniform buffers, and descriptor sets for
/// the deferred pass.
pub struct PipelineManager {
    device: Device,

    // Layouts
    uniform_layout: vk::DescriptorSetLayout,
    sampler_layout: vk::DescriptorSetLayout,
    input_layout: vk::DescriptorSetLayout,

    // Pools, sized a priori and never grown
    uniform_pool: vk::DescriptorPool,
    sampler_pool: vk::DescriptorPool,
    input_pool: vk::DescriptorPool,

    // Per-swapchain-image uniforms
    vp_uniform_buffers: Vec<UniformBuffer<UboViewProjection>>,
    model_dynamic_buffers: Vec<Buffer>,
    uniform_sets: Vec<vk::DescriptorSet>,
    input_sets: Vec<vk::DescriptorSet>,

    // Per-texture sampler sets, parallel to the texture registry
    texture_sets: Vec<vk::DescriptorSet>,

    transfer_space: ModelTransferSpace,
}

impl PipelineManager {
    /// Create the descriptor machinery for `image_count` swapchain images.
    pub fn new(
        device: Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        image_count: usize,
        min_uniform_offset_alignment: u64,
    ) -> VulkanResult<Self> {
        let transfer_space = ModelTransferSpace::new(min_uniform_offset_alignment);

        let uniform_layout = create_uniform_layout(&device)?;
        let sampler_layout = create_sampler_layout(&device)?;
        let input_layout = create_input_layout(&device)?;

        let uniform_pool = create_pool(
            &device,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: image_count as u32,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    descriptor_count: image_count as u32,
                },
            ],
            image_count as u32,
        )?;
        let sampler_pool = create_pool(
            &device,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_OBJECTS as u32,
            }],
            MAX_OBJECTS as u32,
        )?;
        let input_pool = create_pool(
            &device,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::INPUT_ATTACHMENT,
                descriptor_count: (image_count * 3) as u32,
            }],
            image_count as u32,
        )?;

        let mut vp_uniform_buffers = Vec::with_capacity(image_count);
        let mut model_dynamic_buffers = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            vp_uniform_buffers.push(UniformBuffer::new(
                device.clone(),
                instance,
                physical_device,
            )?);
            model_dynamic_buffers.push(Buffer::new(
                device.clone(),
                instance,
                physical_device,
                transfer_space.size() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?);
        }

        let uniform_sets = allocate_sets(&device, uniform_pool, uniform_layout, image_count)?;
        let input_sets = allocate_sets(&device, input_pool, input_layout, image_count)?;

        // Point each per-image set at its buffers
        for (i, &set) in uniform_sets.iter().enumerate() {
            let vp_info = [vk::DescriptorBufferInfo {
                buffer: vp_uniform_buffers[i].handle(),
                offset: 0,
                range: mem::size_of::<UboViewProjection>() as vk::DeviceSize,
            }];
            let model_info = [vk::DescriptorBufferInfo {
                buffer: model_dynamic_buffers[i].handle(),
                offset: 0,
                range: transfer_space.stride() as vk::DeviceSize,
            }];

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&vp_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(&model_info)
                    .build(),
            ];

            unsafe {
                device.update_descriptor_sets(&writes, &[]);
            }
        }

        Ok(Self {
            device,
            uniform_layout,
            sampler_layout,
            input_layout,
            uniform_pool,
            sampler_pool,
            input_pool,
            vp_uniform_buffers,
            model_dynamic_buffers,
            uniform_sets,
            input_sets,
            texture_sets: Vec::new(),
            transfer_space,
        })
    }

    /// Set layouts for the geometry pipeline, in set-number order.
    pub fn geometry_set_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.uniform_layout, self.sampler_layout]
    }

    /// Set layouts for the composition pipeline.
    pub fn composition_set_layouts(&self) -> [vk::DescriptorSetLayout; 1] {
        [self.input_layout]
    }

    pub fn uniform_set(&self, image_index: usize) -> vk::DescriptorSet {
        self.uniform_sets[image_index]
    }

    pub fn input_set(&self, image_index: usize) -> vk::DescriptorSet {
        self.input_sets[image_index]
    }

    pub fn texture_set(&self, texture_id: usize) -> VulkanResult<vk::DescriptorSet> {
        self.texture_sets
            .get(texture_id)
            .copied()
            .ok_or(VulkanError::InvalidOperation {
                reason: format!("no descriptor set for texture {}", texture_id),
            })
    }

    pub fn transfer_space(&self) -> &ModelTransferSpace {
        &self.transfer_space
    }

    pub fn transfer_space_mut(&mut self) -> &mut ModelTransferSpace {
        &mut self.transfer_space
    }

    /// Allocate and write a sampler descriptor set for a texture.
    ///
    /// Must be called in texture-registry order so set indices line up
    /// with texture indices.
    pub fn create_texture_set(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> VulkanResult<usize> {
        if self.texture_sets.len() >= MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "texture descriptor pool",
                limit: MAX_OBJECTS,
            });
        }

        let set = allocate_sets(&self.device, self.sampler_pool, self.sampler_layout, 1)?[0];

        let image_info = [vk::DescriptorImageInfo {
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            image_view: view,
            sampler,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();

        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }

        self.texture_sets.push(set);
        Ok(self.texture_sets.len() - 1)
    }

    /// Point the per-image input-attachment sets at the current
    /// intermediate views. Called at init and after swapchain recreation.
    pub fn write_input_sets(
        &self,
        colour_view: vk::ImageView,
        normal_view: vk::ImageView,
        depth_view: vk::ImageView,
    ) {
        for &set in &self.input_sets {
            let infos: Vec<[vk::DescriptorImageInfo; 1]> = [colour_view, normal_view, depth_view]
                .iter()
                .map(|&view| {
                    [vk::DescriptorImageInfo {
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        image_view: view,
                        sampler: vk::Sampler::null(),
                    }]
                })
                .collect();

            let writes: Vec<vk::WriteDescriptorSet> = infos
                .iter()
                .enumerate()
                .map(|(binding, info)| {
                    vk::WriteDescriptorSet::builder()
                        .dst_set(set)
                        .dst_binding(binding as u32)
                        .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                        .image_info(info)
                        .build()
                })
                .collect();

            unsafe {
                self.device.update_descriptor_sets(&writes, &[]);
            }
        }
    }

    /// Upload the view-projection matrices for one swapchain image.
    pub fn update_view_projection(
        &self,
        image_index: usize,
        vp: &UboViewProjection,
    ) -> VulkanResult<()> {
        self.vp_uniform_buffers[image_index].update(vp)
    }

    /// Copy the first `count` transfer-space entries into the dynamic
    /// uniform buffer for one swapchain image.
    pub fn upload_model_transforms(&self, image_index: usize, count: usize) -> VulkanResult<()> {
        if count > MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "model transforms per frame",
                limit: MAX_OBJECTS,
            });
        }
        if count == 0 {
            return Ok(());
        }
        self.model_dynamic_buffers[image_index]
            .write_bytes_at(0, self.transfer_space.bytes_for(count))
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        unsafe {
            // Pools free their sets implicitly
            self.device.destroy_descriptor_pool(self.uniform_pool, None);
            self.device.destroy_descriptor_pool(self.sampler_pool, None);
            self.device.destroy_descriptor_pool(self.input_pool, None);
            self.device
                .destroy_descriptor_set_layout(self.uniform_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.sampler_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.input_layout, None);
        }
        // Uniform buffers drop afterwards
    }
}

fn create_uniform_layout(device: &Device) -> VulkanResult<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
    ];
    create_layout(device, &bindings)
}

fn create_sampler_layout(device: &Device) -> VulkanResult<vk::DescriptorSetLayout> {
    let bindings = [vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)
        .build()];
    create_layout(device, &bindings)
}

fn create_input_layout(device: &Device) -> VulkanResult<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..3)
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build()
        })
        .collect();
    create_layout(device, &bindings)
}

fn create_layout(
    device: &Device,
    bindings: &[vk::DescriptorSetLayoutBinding],
) -> VulkanResult<vk::DescriptorSetLayout> {
    let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
    unsafe {
        device
            .create_descriptor_set_layout(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

fn create_pool(
    device: &Device,
    sizes: &[vk::DescriptorPoolSize],
    max_sets: u32,
) -> VulkanResult<vk::DescriptorPool> {
    let create_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(sizes)
        .max_sets(max_sets);
    unsafe {
        device
            .create_descriptor_pool(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

fn allocate_sets(
    device: &Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    count: usize,
) -> VulkanResult<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; count];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    unsafe {
        device
            .allocate_descriptor_sets(&alloc_info)
            .map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> UboModel {
        UboModel {
            model: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[test]
    fn transfer_space_stride_is_aligned() {
        let space = ModelTransferSpace::new(256);
        assert_eq!(space.stride(), 256);
        assert_eq!(space.size(), 256 * MAX_OBJECTS);

        // Alignment smaller than the struct rounds up to the next multiple
        let space = ModelTransferSpace::new(16);
        assert_eq!(space.stride(), mem::size_of::<UboModel>());
    }

    #[test]
    fn transfer_space_entries_round_trip() {
        let mut space = ModelTransferSpace::new(256);
        let mut m = identity();
        m.model[3][0] = 5.0;
        space.set(0, &identity()).unwrap();
        space.set(3, &m).unwrap();

        assert_eq!(space.get(0).unwrap().model, identity().model);
        assert_eq!(space.get(3).unwrap().model[3][0], 5.0);
        // Neighbouring entries are untouched
        assert_eq!(space.get(2).unwrap().model, UboModel::zeroed().model);
    }

    #[test]
    fn transfer_space_full_occupancy_no_aliasing() {
        // Distinct matrices in every slot must survive intact across the
        // device alignments seen in the wild, including the degenerate 1.
        for alignment in [1u64, 16, 64, 256] {
            let mut space = ModelTransferSpace::new(alignment);
            for ordinal in 0..MAX_OBJECTS {
                let mut m = identity();
                m.model[3][0] = ordinal as f32;
                m.model[3][1] = (ordinal * 31 + 7) as f32;
                space.set(ordinal, &m).unwrap();
            }
            for ordinal in 0..MAX_OBJECTS {
                let read = space.get(ordinal).unwrap();
                assert_eq!(
                    read.model[3][0],
                    ordinal as f32,
                    "entry {} corrupted at alignment {}",
                    ordinal,
                    alignment
                );
                assert_eq!(read.model[3][1], (ordinal * 31 + 7) as f32);
                assert_eq!(read.model[0][0], 1.0);
            }
        }
    }

    #[test]
    fn transfer_space_rejects_out_of_range_ordinals() {
        let mut space = ModelTransferSpace::new(64);
        let result = space.set(MAX_OBJECTS, &identity());
        assert!(matches!(
            result,
            Err(VulkanError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn dynamic_offsets_follow_the_stride() {
        let space = ModelTransferSpace::new(256);
        assert_eq!(space.dynamic_offset(0), 0);
        assert_eq!(space.dynamic_offset(1), 256);
        assert_eq!(space.dynamic_offset(5), 1280);
    }

    #[test]
    fn draw_bindings_use_flat_ordinals() {
        let bindings = plan_draw_bindings(&[2, 0], 256);
        assert_eq!(bindings.len(), 2);
        assert_eq!(
            bindings[0],
            DrawBinding {
                ordinal: 0,
                texture_id: 2,
                dynamic_offset: 0,
            }
        );
        assert_eq!(
            bindings[1],
            DrawBinding {
                ordinal: 1,
                texture_id: 0,
                dynamic_offset: 256,
            }
        );
    }

    #[test]
    fn draw_bindings_match_transfer_space_offsets() {
        let space = ModelTransferSpace::new(256);
        let bindings = plan_draw_bindings(&[0, 0, 1], space.stride());
        for binding in &bindings {
            assert_eq!(binding.dynamic_offset, space.dynamic_offset(binding.ordinal));
        }
    }
}
