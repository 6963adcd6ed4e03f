//! Image decoding for texture uploads

use std::path::Path;

use super::AssetError;

/// A decoded image in the layout textures are uploaded in.
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decode an image file into tightly packed RGBA8 pixels.
pub fn load_rgba8<P: AsRef<Path>>(path: P) -> Result<RgbaImage, AssetError> {
    let path = path.as_ref();
    let decoded = image::open(path)?.to_rgba8();
    let (width, height) = decoded.dimensions();

    log::debug!("Loaded image {} ({}x{})", path.display(), width, height);

    Ok(RgbaImage {
        width,
        height,
        pixels: decoded.into_raw(),
    })
}
