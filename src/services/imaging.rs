//! Person-image preparation.
//!
//! The try-on models expect a 768x1024 portrait. Inputs are scaled to fit
//! inside that box without cropping and centred on a white canvas.

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub const TARGET_WIDTH: u32 = 768;
pub const TARGET_HEIGHT: u32 = 1024;

/// Resize into the provider geometry and encode as PNG.
///
/// Deterministic: the same input bytes always produce the same output bytes.
pub fn normalize_person_image(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let source = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
    let fitted = source
        .resize(TARGET_WIDTH, TARGET_HEIGHT, FilterType::Lanczos3)
        .to_rgba8();

    let mut canvas = RgbaImage::from_pixel(TARGET_WIDTH, TARGET_HEIGHT, Rgba([255, 255, 255, 255]));
    let x = (TARGET_WIDTH - fitted.width()) / 2;
    let y = (TARGET_HEIGHT - fitted.height()) / 2;
    image::imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));

    let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    flattened
        .write_to(&mut out, ImageFormat::Png)
        .map_err(ImageError::Encode)?;
    Ok(out.into_inner())
}

/// An inline image decoded from a request body.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl InlineImage {
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

/// Decode a `data:image/...;base64,` URL or bare base64 into image bytes.
pub fn decode_inline_image(input: &str) -> Result<InlineImage, ImageError> {
    let payload = match input.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or(ImageError::MalformedDataUrl)?,
        None => input.trim(),
    };

    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(ImageError::Base64)?;

    let format = image::guess_format(&bytes).map_err(|_| ImageError::UnsupportedFormat)?;
    Ok(InlineImage { bytes, format })
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),

    #[error("Invalid base64 image data: {0}")]
    Base64(base64::DecodeError),

    #[error("Malformed data URL")]
    MalformedDataUrl,

    #[error("Unsupported image format")]
    UnsupportedFormat,
}
