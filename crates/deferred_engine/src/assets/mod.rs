//! Asset loading: images and models

pub mod image_loader;
pub mod model_loader;

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("model load failed: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("malformed asset: {0}")]
    Malformed(String),
}
