//! Inference backend abstraction for segmentation models

use crate::error::Result;
use crate::models::PreprocessingConfig;
use ndarray::Array4;

/// Runs a segmentation model on a preprocessed NCHW tensor
///
/// Backends are loaded once and shared across requests, so inference takes
/// `&self`.
pub trait InferenceBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run inference on the input tensor, returning a `(1, 1, H, W)` mask
    ///
    /// # Errors
    /// - Model inference failures
    /// - Unexpected output tensor shape
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Input preparation parameters of the loaded model
    fn preprocessing_config(&self) -> &PreprocessingConfig;
}
