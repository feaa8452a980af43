//! Image transport encoding and format handling
//!
//! Keeps byte-level concerns (base64 transport text, format sniffing, PNG
//! encoding) out of the dispatch logic.

use crate::error::{ImageEditError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Header-level facts about an encoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Stateless codec between raw image bytes and their transport forms
pub struct ImageCodec;

impl ImageCodec {
    /// Encode bytes as standard base64 text
    ///
    /// # Examples
    /// ```rust
    /// use canvas_image_edit::ImageCodec;
    ///
    /// let text = ImageCodec::encode(b"\x89PNG");
    /// assert_eq!(ImageCodec::decode(&text).unwrap(), b"\x89PNG");
    /// ```
    #[must_use]
    pub fn encode(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    /// Decode standard base64 text back into bytes
    ///
    /// # Errors
    /// - Text is not valid padded base64
    pub fn decode(text: &str) -> Result<Vec<u8>> {
        BASE64
            .decode(text.trim())
            .map_err(|e| ImageEditError::validation(format!("invalid base64 image data: {e}")))
    }

    /// Sniff the format and read dimensions without decoding pixels
    ///
    /// # Errors
    /// - Unknown or corrupt image header
    pub fn probe(bytes: &[u8]) -> Result<ImageProbe> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageEditError::validation(format!("unreadable image data: {e}")))?;
        let format = reader
            .format()
            .ok_or_else(|| ImageEditError::validation("unrecognized image format"))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ImageEditError::validation(format!("image cannot be decoded: {e}")))?;

        Ok(ImageProbe {
            format,
            width,
            height,
        })
    }

    /// Decode an encoded image into pixels
    ///
    /// # Errors
    /// - Unknown or corrupt image data
    pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Encode an RGBA buffer as PNG, keeping the alpha channel
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(buffer)
    }

    /// MIME type used when forwarding an image to a remote API
    #[must_use]
    pub fn mime_type(format: ImageFormat) -> &'static str {
        format.to_mime_type()
    }
}
