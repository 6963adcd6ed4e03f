//! Rendering subsystem

pub mod camera;
pub mod mesh;
pub mod vulkan;

pub use camera::Camera;
pub use mesh::{Mesh, MeshData, Model};
