//! Background removal for edited images
//!
//! A segmentation model predicts a per-pixel foreground probability; the
//! prediction becomes the alpha channel of the output, so subjects survive
//! regardless of how close their colour is to the backdrop.

use crate::{
    backends::TractBackend,
    error::{ImageEditError, Result},
    inference::InferenceBackend,
    models::SegmentationModel,
    preprocessing::{CoordinateTransformation, ImagePreprocessor},
};
use image::{DynamicImage, Rgba, RgbaImage};
use instant::Instant;
use ndarray::Array4;
use std::path::Path;
use std::sync::Arc;

/// Removes the background of an image, producing RGBA output
pub trait BackgroundRemover: Send + Sync {
    /// # Errors
    /// - Segmentation inference failures
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Foreground mask with one alpha value per pixel (0 = background)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundMask {
    pub data: Vec<u8>,
    pub dimensions: (u32, u32),
}

impl ForegroundMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Map a `(1, 1, H, W)` model output back onto an image of `dimensions`
    ///
    /// Pixels are sampled nearest-neighbour through the same placement used
    /// for preprocessing; probabilities are clamped to 0-1 and scaled to 0-255.
    ///
    /// # Errors
    /// - Tensor is not a single-batch, single-channel mask
    pub fn from_tensor(tensor: &Array4<f32>, dimensions: (u32, u32)) -> Result<Self> {
        let &[batch, channels, mask_height, mask_width] = tensor.shape() else {
            return Err(ImageEditError::inference("Invalid output tensor shape"));
        };
        if batch != 1 || channels != 1 {
            return Err(ImageEditError::inference(format!(
                "Expected a (1, 1, H, W) mask, got {:?}",
                tensor.shape()
            )));
        }

        let (width, height) = dimensions;
        let placement =
            CoordinateTransformation::fit(dimensions, (mask_width as u32, mask_height as u32));

        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                let probability = placement
                    .to_canvas(x, y)
                    .and_then(|(tx, ty)| tensor.get([0, 0, ty as usize, tx as usize]).copied())
                    .unwrap_or(0.0);
                data.push((probability.clamp(0.0, 1.0) * 255.0) as u8);
            }
        }

        Ok(Self::new(data, dimensions))
    }

    /// Fraction of pixels classified as foreground
    #[must_use]
    pub fn coverage(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let kept = self.data.iter().filter(|&&value| value > 0).count();
        kept as f32 / self.data.len() as f32
    }

    /// Apply the mask to an image, clearing every background pixel
    #[must_use]
    pub fn apply(&self, image: &DynamicImage) -> RgbaImage {
        let rgba_image = image.to_rgba8();
        let (width, height) = rgba_image.dimensions();
        let mut result = RgbaImage::new(width, height);

        for (x, y, pixel) in rgba_image.enumerate_pixels() {
            let pixel_index = (y * width + x) as usize;
            let mask_value = self.data.get(pixel_index).copied().unwrap_or(0);

            if mask_value > 0 {
                let alpha = pixel[3].min(mask_value);
                result.put_pixel(x, y, Rgba([pixel[0], pixel[1], pixel[2], alpha]));
            } else {
                result.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }

        result
    }
}

/// Background remover driven by a segmentation model
pub struct SegmentationRemover {
    backend: Arc<dyn InferenceBackend>,
}

impl SegmentationRemover {
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Load `variant` of the cached model in `model_path` with Tract
    ///
    /// Blocking: parses and optimizes the ONNX graph.
    ///
    /// # Errors
    /// - Invalid model directory or missing variant
    /// - ONNX loading failures
    pub fn load(model_path: &Path, variant: &str) -> Result<Self> {
        let model = SegmentationModel::open(model_path, variant)?;
        let backend = TractBackend::from_model(&model)?;
        Ok(Self::new(Arc::new(backend)))
    }
}

impl BackgroundRemover for SegmentationRemover {
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let start = Instant::now();
        let dimensions = (image.width(), image.height());

        let input =
            ImagePreprocessor::preprocess_for_inference(image, self.backend.preprocessing_config())?;
        let output = self.backend.infer(&input)?;
        let mask = ForegroundMask::from_tensor(&output, dimensions)?;

        log::debug!(
            "Background removed with {} in {}ms: {:.1}% foreground",
            self.backend.name(),
            start.elapsed().as_millis(),
            mask.coverage() * 100.0
        );
        Ok(mask.apply(image))
    }
}
