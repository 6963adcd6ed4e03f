//! Engine constants and renderer configuration
//!
//! Compile-time limits for the frame engine plus a serializable
//! configuration block loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAME_DRAWS: usize = 2;

/// Upper bound on meshes drawn per frame. Descriptor pools and the
/// dynamic-uniform transfer block are sized from this at init and never
/// resized; exceeding it is a hard error.
pub const MAX_OBJECTS: usize = 64;

/// File suffix for precompiled SPIR-V shader binaries.
pub const COMPILED_SHADER_SUFFIX: &str = ".spv";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Renderer configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name passed to instance creation
    pub application_name: String,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Directory containing compiled SPIR-V shader binaries
    pub shader_dir: String,
    /// Directory containing model files
    pub model_dir: String,
    /// Directory containing texture files
    pub texture_dir: String,
    /// Whether to enable validation layers (debug builds only)
    pub enable_validation: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Deferred Renderer".to_string(),
            window_width: 1280,
            window_height: 720,
            shader_dir: "res/shaders".to_string(),
            model_dir: "res/models".to_string(),
            texture_dir: "res/textures".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Resolve a shader name to its compiled binary path.
    pub fn shader_path(&self, name: &str) -> String {
        format!("{}/{}{}", self.shader_dir, name, COMPILED_SHADER_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = RendererConfig::default();
        assert!(config.window_width > 0);
        assert!(config.window_height > 0);
        assert_eq!(config.shader_path("deferred_vert"), "res/shaders/deferred_vert.spv");
    }

    #[test]
    fn parses_partial_toml() {
        let config: RendererConfig = toml::from_str("application_name = \"demo\"").unwrap();
        assert_eq!(config.application_name, "demo");
        assert_eq!(config.window_width, 1280);
    }
}
