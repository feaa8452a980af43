//! Tract inference backend
//!
//! Pure Rust ONNX inference for the segmentation model, CPU only.

use crate::error::{ImageEditError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, PreprocessingConfig, SegmentationModel};
use instant::Instant;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Segmentation model loaded into Tract
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
    preprocessing: PreprocessingConfig,
    info: ModelInfo,
}

impl TractBackend {
    /// Load the selected variant of a cached model
    ///
    /// # Errors
    /// - Model file unreadable
    /// - ONNX parsing or optimization failures
    pub fn from_model(model: &SegmentationModel) -> Result<Self> {
        let model_data = model.load_model_data()?;
        let info = model.info(model_data.len());
        Self::from_onnx_bytes(&model_data, model.preprocessing_config().clone(), info)
    }

    /// Build a runnable model from ONNX bytes
    ///
    /// # Errors
    /// - ONNX parsing or optimization failures
    pub fn from_onnx_bytes(
        model_data: &[u8],
        preprocessing: PreprocessingConfig,
        info: ModelInfo,
    ) -> Result<Self> {
        let load_start = Instant::now();
        let [height, width] = preprocessing.target_size;

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| ImageEditError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, height as usize, width as usize]).into())
            .map_err(|e| ImageEditError::model(format!("Failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| ImageEditError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| ImageEditError::model(format!("Failed to create runnable model: {e}")))?;

        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!(
            "Segmentation model {} loaded with Tract in {}ms ({size_mb:.2} MB)",
            info.name,
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            model,
            preprocessing,
            info,
        })
    }

    #[must_use]
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &str {
        "tract"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("Running Tract inference on {:?}", input.shape());

        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data)
            .map_err(|e| ImageEditError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| ImageEditError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| ImageEditError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            ImageEditError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let &[batch, channels, height, width] = output_data.shape() else {
            return Err(ImageEditError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_data.ndim()
            )));
        };

        let output_array = Array4::from_shape_vec(
            (batch, channels, height, width),
            output_data.iter().copied().collect(),
        )
        .map_err(|e| ImageEditError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );
        Ok(output_array)
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }
}
