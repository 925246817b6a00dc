use std::fs;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbImage};
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// A captured frame kept both as the original encoded bytes (forwarded to a
/// remote encoder untouched) and as decoded RGB pixels (used locally).
#[derive(Debug, Clone)]
pub struct CapturedImage {
    origin: String,
    bytes: Vec<u8>,
    rgb: RgbImage,
}

impl CapturedImage {
    pub fn open(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path).map_err(|source| AppError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path.display().to_string(), bytes)
    }

    pub fn from_bytes(origin: impl Into<String>, bytes: Vec<u8>) -> AppResult<Self> {
        let origin = origin.into();
        let decoded = image::load_from_memory(&bytes).map_err(|source| AppError::ImageDecode {
            origin: origin.clone(),
            source,
        })?;
        let rgb = decoded.to_rgb8();
        debug!(
            origin = %origin,
            width = rgb.width(),
            height = rgb.height(),
            "decoded captured image"
        );
        Ok(Self { origin, bytes, rgb })
    }

    /// Wraps already decoded pixels, producing a PNG encoding for transports
    /// that need bytes.
    pub fn from_rgb(origin: impl Into<String>, rgb: RgbImage) -> AppResult<Self> {
        let origin = origin.into();
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|source| AppError::ImageDecode {
                origin: origin.clone(),
                source,
            })?;
        Ok(Self { origin, bytes, rgb })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// File name presented to remote services.
    pub fn file_name(&self) -> String {
        Path::new(&self.origin)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "capture.png".to_string())
    }
}
