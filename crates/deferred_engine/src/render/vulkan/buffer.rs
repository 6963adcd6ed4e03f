//! Buffer management for vertex, index, and uniform data
//!
//! Memory allocation follows the explicit Vulkan path: query requirements,
//! pick the first memory type whose bit is set in the requirements mask and
//! whose property flags are a superset of the request, allocate, bind.
//! Device-local buffers are filled through a temporary staging buffer and a
//! one-shot transfer command.

use ash::{vk, Device};
use std::mem;

use super::commands::{begin_one_shot, submit_one_shot};
use super::{VulkanError, VulkanResult};

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two, which Vulkan guarantees for
/// `minUniformBufferOffsetAlignment`.
pub fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Select a memory type index from a memory-properties table.
///
/// Returns the lowest index that is allowed by `type_filter` and whose
/// property flags contain all of `properties`.
pub fn find_memory_type_in(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for i in 0..mem_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && (mem_properties.memory_types[i as usize].property_flags & properties) == properties
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// Query the device's memory properties and select a memory type.
pub fn find_memory_type(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let mem_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };
    find_memory_type_in(&mem_properties, type_filter, properties)
}

/// Buffer wrapper owning its memory, released on drop.
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and back it with freshly allocated memory.
    pub fn new(
        device: Device,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = find_memory_type(
            instance,
            physical_device,
            mem_requirements.memory_type_bits,
            properties,
        )
        .map_err(|e| {
            unsafe { device.destroy_buffer(buffer, None) };
            e
        })?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device.allocate_memory(&alloc_info, None).map_err(|e| {
                device.destroy_buffer(buffer, None);
                VulkanError::Api(e)
            })?
        };

        unsafe {
            device.bind_buffer_memory(buffer, memory, 0).map_err(|e| {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
                VulkanError::Api(e)
            })?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Map the whole buffer for writing.
    pub fn map_memory(&self) -> VulkanResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    pub fn unmap_memory(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Copy a slice into the buffer. Host-visible memory only.
    pub fn write_data<T: Copy>(&self, data: &[T]) -> VulkanResult<()> {
        let data_ptr = self.map_memory()?;

        unsafe {
            let src_ptr = data.as_ptr() as *const std::ffi::c_void;
            let size = data.len() * mem::size_of::<T>();
            std::ptr::copy_nonoverlapping(src_ptr, data_ptr, size);
        }

        self.unmap_memory();
        Ok(())
    }

    /// Copy raw bytes into the buffer at an offset. Host-visible memory only.
    pub fn write_bytes_at(&self, offset: usize, bytes: &[u8]) -> VulkanResult<()> {
        if offset + bytes.len() > self.size as usize {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    bytes.len(),
                    offset,
                    self.size
                ),
            });
        }
        let data_ptr = self.map_memory()?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (data_ptr as *mut u8).add(offset),
                bytes.len(),
            );
        }
        self.unmap_memory();
        Ok(())
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Record and submit a buffer-to-buffer copy, waiting for completion.
pub fn copy_buffer(
    device: &Device,
    command_pool: vk::CommandPool,
    transfer_queue: vk::Queue,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> VulkanResult<()> {
    let command_buffer = begin_one_shot(device, command_pool)?;

    let copy_region = vk::BufferCopy::builder()
        .src_offset(0)
        .dst_offset(0)
        .size(size)
        .build();

    unsafe {
        device.cmd_copy_buffer(command_buffer, src, dst, &[copy_region]);
    }

    submit_one_shot(device, command_pool, transfer_queue, command_buffer)
}

/// Create a device-local buffer filled with `data` via a staging buffer.
fn device_local_with_data<T: Copy>(
    device: Device,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    command_pool: vk::CommandPool,
    transfer_queue: vk::Queue,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> VulkanResult<Buffer> {
    let size = (data.len() * mem::size_of::<T>()) as vk::DeviceSize;

    let staging = Buffer::new(
        device.clone(),
        instance,
        physical_device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    staging.write_data(data)?;

    let buffer = Buffer::new(
        device.clone(),
        instance,
        physical_device,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    copy_buffer(
        &device,
        command_pool,
        transfer_queue,
        staging.handle(),
        buffer.handle(),
        size,
    )?;

    // Staging buffer drops here, after the transfer has completed
    Ok(buffer)
}

/// Device-local vertex buffer
pub struct VertexBuffer {
    buffer: Buffer,
    vertex_count: u32,
}

impl VertexBuffer {
    pub fn new<T: Copy>(
        device: Device,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        command_pool: vk::CommandPool,
        transfer_queue: vk::Queue,
        vertices: &[T],
    ) -> VulkanResult<Self> {
        let buffer = device_local_with_data(
            device,
            instance,
            physical_device,
            command_pool,
            transfer_queue,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
        )?;

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Device-local index buffer
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    pub fn new(
        device: Device,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        command_pool: vk::CommandPool,
        transfer_queue: vk::Queue,
        indices: &[u32],
    ) -> VulkanResult<Self> {
        let buffer = device_local_with_data(
            device,
            instance,
            physical_device,
            command_pool,
            transfer_queue,
            vk::BufferUsageFlags::INDEX_BUFFER,
            indices,
        )?;

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Host-visible uniform buffer for a single `T`.
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Copy> UniformBuffer<T> {
    pub fn new(
        device: Device,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        let size = mem::size_of::<T>() as vk::DeviceSize;

        let buffer = Buffer::new(
            device,
            instance,
            physical_device,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = flags.len() as u32;
        for (i, &f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = f;
        }
        props
    }

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(200, 256), 256);
    }

    #[test]
    fn picks_lowest_matching_memory_type() {
        let table = memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type_in(
            &table,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_type_filter_mask() {
        let table = memory_table(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Index 0 is excluded by the requirements mask
        let index = find_memory_type_in(
            &table,
            0b10,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn superset_flags_are_accepted() {
        let table = memory_table(&[vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT
            | vk::MemoryPropertyFlags::HOST_CACHED]);

        let index =
            find_memory_type_in(&table, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn fails_when_nothing_matches() {
        let table = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type_in(&table, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
