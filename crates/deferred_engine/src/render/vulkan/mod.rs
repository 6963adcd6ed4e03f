//! Vulkan backend
//!
//! All direct ash usage lives under this module. Every Vulkan handle is
//! owned by an RAII wrapper whose `Drop` destroys it, so teardown order is
//! fixed by struct field order rather than by hand-written cleanup code.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex_layout;
pub mod window;

use ash::vk;
use thiserror::Error;

/// Errors from the Vulkan backend. All of these are fatal to the frame
/// engine; callers propagate them to the top level rather than recovering.
#[derive(Error, Debug)]
pub enum VulkanError {
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("no suitable memory type for requirements")]
    NoSuitableMemoryType,

    #[error("no supported format among candidates for {usage}")]
    UnsupportedFormat { usage: &'static str },

    #[error("unsupported image layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    #[error("capacity exceeded for {what}: limit {limit}")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("shader load failed: {0}")]
    ShaderLoad(String),
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        VulkanError::Api(result)
    }
}

pub type VulkanResult<T> = Result<T, VulkanError>;

pub use buffer::{Buffer, IndexBuffer, VertexBuffer};
pub use commands::CommandPool;
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanInstance};
pub use pipeline::{PipelineConfig, PipelineManager};
pub use renderer::VulkanRenderer;
pub use texture::{Texture, TextureManager};
pub use window::Window;
