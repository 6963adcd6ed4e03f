//! Deferred-shading Vulkan rendering engine
//!
//! A two-subpass deferred renderer built directly on ash. The geometry
//! subpass writes colour, normal, and depth intermediates; the composition
//! subpass reads them as input attachments and resolves the lit image to
//! the swapchain. Frames are pipelined with a fixed number of
//! frames-in-flight, and every Vulkan handle is owned by an RAII wrapper.
//!
//! Typical usage:
//!
//! ```no_run
//! use deferred_engine::config::RendererConfig;
//! use deferred_engine::render::vulkan::{VulkanRenderer, Window};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RendererConfig::default();
//! let mut window = Window::new(&config.application_name, 1280, 720)?;
//! let mut renderer = VulkanRenderer::new(&mut window, config)?;
//!
//! while !window.should_close() {
//!     window.poll_events();
//!     renderer.draw(&mut window)?;
//! }
//! renderer.wait_idle()?;
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

pub use config::{RendererConfig, MAX_FRAME_DRAWS, MAX_OBJECTS};
pub use render::vulkan::{VulkanError, VulkanRenderer, VulkanResult, Window};
pub use render::{Camera, MeshData, Model};
