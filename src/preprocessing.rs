//! Image preparation for segmentation and the inverse mapping for its output
//!
//! Images are resized with their aspect ratio kept, centered on a white
//! canvas of the model input size and normalized into an NCHW tensor.
//! [`CoordinateTransformation`] maps original pixels back onto that canvas.

use crate::error::{ImageEditError, Result};
use crate::models::PreprocessingConfig;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;

const PADDING_COLOR: [u8; 3] = [255, 255, 255];

/// Placement of an original image on the model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransformation {
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl CoordinateTransformation {
    /// Fit `original` (width, height) into a canvas of `canvas` (width, height)
    #[must_use]
    pub fn fit(original: (u32, u32), canvas: (u32, u32)) -> Self {
        let (orig_width, orig_height) = (original.0.max(1) as f32, original.1.max(1) as f32);
        let (canvas_width, canvas_height) = canvas;

        let scale = (canvas_width as f32 / orig_width).min(canvas_height as f32 / orig_height);
        let scaled_width = ((orig_width * scale).round() as u32).clamp(1, canvas_width.max(1));
        let scaled_height = ((orig_height * scale).round() as u32).clamp(1, canvas_height.max(1));

        Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: canvas_width.saturating_sub(scaled_width) / 2,
            offset_y: canvas_height.saturating_sub(scaled_height) / 2,
            canvas_width,
            canvas_height,
        }
    }

    /// Canvas position of an original pixel, None outside the canvas
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        let canvas_x = (x as f32 * self.scale).round() as u32 + self.offset_x;
        let canvas_y = (y as f32 * self.scale).round() as u32 + self.offset_y;
        (canvas_x < self.canvas_width && canvas_y < self.canvas_height)
            .then_some((canvas_x, canvas_y))
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image into the model's normalized NCHW input tensor
    ///
    /// # Errors
    /// - Zero-sized model input or image
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_height, target_width] = config.target_size;
        if target_height == 0 || target_width == 0 {
            return Err(ImageEditError::model("Model input size must be non-zero"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(ImageEditError::validation("Image has no pixels"));
        }

        let rgb_image = image.to_rgb8();
        let placement =
            CoordinateTransformation::fit(rgb_image.dimensions(), (target_width, target_height));

        let resized = image::imageops::resize(
            &rgb_image,
            placement.scaled_width,
            placement.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(target_width, target_height, Rgb(PADDING_COLOR));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(placement.offset_x),
            i64::from(placement.offset_y),
        );

        Ok(Self::canvas_to_tensor(&canvas, config))
    }

    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = (f32::from(pixel[channel]) / 255.0 - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = value;
                }
            }
        }

        tensor
    }
}
