//! Mesh and model containers
//!
//! A `Mesh` owns device-local vertex and index buffers, a texture index
//! into the renderer's registry, and its own transform. A `Model` groups
//! the meshes loaded from one file under a shared baseline transform.

use ash::{vk, Device};
use nalgebra::Matrix4;

use super::vulkan::buffer::{IndexBuffer, VertexBuffer};
use super::vulkan::vertex_layout::Vertex;
use super::vulkan::VulkanResult;

/// CPU-side mesh description before upload
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Index into the texture registry; 0 is the default white texture
    pub texture_id: usize,
}

/// A renderable mesh with device-resident geometry
pub struct Mesh {
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    texture_id: usize,
    transform: Matrix4<f32>,
}

impl Mesh {
    /// Upload mesh data to device-local buffers.
    pub fn new(
        device: Device,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        command_pool: vk::CommandPool,
        transfer_queue: vk::Queue,
        data: &MeshData,
    ) -> VulkanResult<Self> {
        let vertex_buffer = VertexBuffer::new(
            device.clone(),
            instance,
            physical_device,
            command_pool,
            transfer_queue,
            &data.vertices,
        )?;
        let index_buffer = IndexBuffer::new(
            device,
            instance,
            physical_device,
            command_pool,
            transfer_queue,
            &data.indices,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            texture_id: data.texture_id,
            transform: Matrix4::identity(),
        })
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    pub fn index_count(&self) -> u32 {
        self.index_buffer.index_count()
    }

    pub fn texture_id(&self) -> usize {
        self.texture_id
    }

    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Matrix4<f32>) {
        self.transform = transform;
    }
}

/// A group of meshes sharing a baseline transform
pub struct Model {
    meshes: Vec<Mesh>,
    transform: Matrix4<f32>,
}

impl Model {
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self {
            meshes,
            transform: Matrix4::identity(),
        }
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut [Mesh] {
        &mut self.meshes
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Matrix4<f32>) {
        self.transform = transform;
    }

    /// World transform of one mesh: model baseline times the mesh's own.
    pub fn mesh_world_transform(&self, mesh_index: usize) -> Matrix4<f32> {
        self.transform * self.meshes[mesh_index].transform()
    }
}
