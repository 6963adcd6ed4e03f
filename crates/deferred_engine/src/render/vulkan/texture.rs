//! Texture resources and the texture registry
//!
//! Textures are uploaded through a staging buffer, transitioned to
//! transfer-destination layout, copied, then either blitted down a full
//! mip chain or transitioned straight to shader-read. The
//! `TextureManager` owns every texture for the lifetime of the renderer
//! and hands out stable indices; index 0 is always a 1x1 white fallback.

use ash::{vk, Device, Instance};

use crate::config::MAX_OBJECTS;

use super::buffer::Buffer;
use super::commands::{begin_one_shot, submit_one_shot};
use super::image::{copy_buffer_to_image, transition_image_layout, DeviceImage};
use super::{VulkanError, VulkanResult};

/// Number of mip levels for a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - largest.leading_zeros()
}

/// Sampled texture with a full mip chain and its own sampler.
pub struct Texture {
    image: DeviceImage,
    sampler: vk::Sampler,
    device: Device,
}

impl Texture {
    /// Create a texture from RGBA8 pixel data.
    #[allow(clippy::too_many_arguments)]
    pub fn from_rgba8(
        device: Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "texture data is {} bytes, expected {} for {}x{} RGBA8",
                    pixels.len(),
                    expected,
                    width,
                    height
                ),
            });
        }

        let mip_levels = mip_level_count(width, height);
        let extent = vk::Extent2D { width, height };
        let format = vk::Format::R8G8B8A8_SRGB;

        let staging = Buffer::new(
            device.clone(),
            instance,
            physical_device,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(pixels)?;

        let image = DeviceImage::new(
            device.clone(),
            instance,
            physical_device,
            extent,
            mip_levels,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        transition_image_layout(
            &device,
            command_pool,
            queue,
            image.handle(),
            mip_levels,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        copy_buffer_to_image(
            &device,
            command_pool,
            queue,
            staging.handle(),
            image.handle(),
            extent,
        )?;

        if mip_levels > 1 {
            generate_mipmaps(
                &device,
                instance,
                physical_device,
                command_pool,
                queue,
                image.handle(),
                format,
                width,
                height,
                mip_levels,
            )?;
        } else {
            transition_image_layout(
                &device,
                command_pool,
                queue,
                image.handle(),
                mip_levels,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
        }

        let sampler = create_sampler(&device, mip_levels)?;

        Ok(Self {
            image,
            sampler,
            device,
        })
    }

    /// Create the 1x1 opaque white fallback texture.
    pub fn default_white(
        device: Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
    ) -> VulkanResult<Self> {
        Self::from_rgba8(
            device,
            instance,
            physical_device,
            command_pool,
            queue,
            1,
            1,
            &[255, 255, 255, 255],
        )
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
        // image drops afterwards
    }
}

fn create_sampler(device: &Device, mip_levels: u32) -> VulkanResult<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(16.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(mip_levels as f32);

    unsafe {
        device
            .create_sampler(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

/// Blit each mip level down from the one above it, transitioning levels to
/// shader-read as they are consumed.
#[allow(clippy::too_many_arguments)]
fn generate_mipmaps(
    device: &Device,
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> VulkanResult<()> {
    let format_props =
        unsafe { instance.get_physical_device_format_properties(physical_device, format) };
    if !format_props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        return Err(VulkanError::InvalidOperation {
            reason: format!("format {:?} does not support linear blitting", format),
        });
    }

    let command_buffer = begin_one_shot(device, command_pool)?;

    let mut barrier = vk::ImageMemoryBarrier::builder()
        .image(image)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build();

    let mut mip_width = width as i32;
    let mut mip_height = height as i32;

    for level in 1..mip_levels {
        // Source level: transfer-dst -> transfer-src
        barrier.subresource_range.base_mip_level = level - 1;
        barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
        barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        let next_width = (mip_width / 2).max(1);
        let next_height = (mip_height / 2).max(1);

        let blit = vk::ImageBlit::builder()
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: mip_width,
                    y: mip_height,
                    z: 1,
                },
            ])
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level - 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: next_width,
                    y: next_height,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();

        unsafe {
            device.cmd_blit_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }

        // Source level is finished: transfer-src -> shader-read
        barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
        barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        mip_width = next_width;
        mip_height = next_height;
    }

    // Last level was only ever a blit destination
    barrier.subresource_range.base_mip_level = mip_levels - 1;
    barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
    barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    submit_one_shot(device, command_pool, queue, command_buffer)
}

/// Owns every texture for the renderer's lifetime and maps them to stable
/// indices. Index 0 is the default white texture.
pub struct TextureManager {
    textures: Vec<Texture>,
}

impl TextureManager {
    /// Create the manager with the default white texture at index 0.
    pub fn new(
        device: Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
    ) -> VulkanResult<Self> {
        let white = Texture::default_white(device, instance, physical_device, command_pool, queue)?;
        Ok(Self {
            textures: vec![white],
        })
    }

    /// Register a texture and return its index.
    ///
    /// Fails with `CapacityExceeded` when the registry is full; the
    /// descriptor pools it feeds are sized a priori and never grow.
    pub fn add(&mut self, texture: Texture) -> VulkanResult<usize> {
        if self.textures.len() >= MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "texture registry",
                limit: MAX_OBJECTS,
            });
        }
        self.textures.push(texture);
        Ok(self.textures.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<&Texture> {
        self.textures.get(index)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_reaches_one_by_one() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1920, 1080), 11);
        assert_eq!(mip_level_count(1, 256), 9);
    }
}
