//! SPIR-V shader module loading

use ash::{vk, Device};
use std::path::Path;

use super::{VulkanError, VulkanResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from raw SPIR-V bytes.
    ///
    /// The byte slice must be 4-byte aligned and a multiple of 4 long, as
    /// SPIR-V is a stream of 32-bit words.
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(VulkanError::ShaderLoad(format!(
                "SPIR-V byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        let (prefix, words, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(VulkanError::ShaderLoad(
                "SPIR-V bytes are not 4-byte aligned".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load a compiled shader binary from disk.
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            VulkanError::ShaderLoad(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(device, &bytes)
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
