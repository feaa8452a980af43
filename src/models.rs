//! Segmentation model metadata
//!
//! Reads a cached model directory: `config.json` for the model type,
//! `preprocessor_config.json` for input size and normalization, and the ONNX
//! file of the selected variant.

use crate::cache::ModelCache;
use crate::error::{ImageEditError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Input preparation parameters of a segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input size as `[height, width]`
    pub target_size: [u32; 2],
    /// Per-channel mean in the 0-1 range
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in the 0-1 range
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
}

/// A cached segmentation model with one resolved variant
#[derive(Debug, Clone)]
pub struct SegmentationModel {
    model_path: PathBuf,
    model_type: String,
    variant: String,
    preprocessing: PreprocessingConfig,
}

impl SegmentationModel {
    /// Open the model in `model_path` for `variant`
    ///
    /// # Errors
    /// - Missing or unparsable configuration files
    /// - Requested variant not present in `onnx/`
    pub fn open(model_path: &Path, variant: &str) -> Result<Self> {
        let model_config = Self::read_json(&model_path.join("config.json"))?;
        let preprocessor = Self::read_json(&model_path.join("preprocessor_config.json"))?;

        let available = ModelCache::available_variants(model_path);
        if !available.iter().any(|v| v == variant) {
            return Err(ImageEditError::model(format!(
                "Requested variant '{variant}' not available in {}. Available: {available:?}",
                model_path.display()
            )));
        }

        let model_type = model_config
            .get("model_type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let preprocessing = PreprocessingConfig {
            target_size: Self::parse_image_size(&preprocessor)?,
            normalization_mean: Self::parse_channels(&preprocessor, "image_mean", 128.0)?,
            normalization_std: Self::parse_channels(&preprocessor, "image_std", 255.0)?,
        };

        Ok(Self {
            model_path: model_path.to_path_buf(),
            model_type,
            variant: variant.to_string(),
            preprocessing,
        })
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Path to the ONNX file of the selected variant
    #[must_use]
    pub fn model_file_path(&self) -> PathBuf {
        self.model_path
            .join("onnx")
            .join(ModelCache::variant_file_name(&self.variant))
    }

    /// Read the ONNX bytes of the selected variant
    ///
    /// # Errors
    /// - Model file missing or unreadable
    pub fn load_model_data(&self) -> Result<Vec<u8>> {
        let model_file_path = self.model_file_path();
        fs::read(&model_file_path).map_err(|e| {
            ImageEditError::file_io_error("read cached model file", &model_file_path, &e)
        })
    }

    /// Describe the model, given the size of its loaded ONNX data
    #[must_use]
    pub fn info(&self, size_bytes: usize) -> ModelInfo {
        let [height, width] = self.preprocessing.target_size;
        ModelInfo {
            name: format!("{}-{}", self.model_type, self.variant),
            precision: self.variant.clone(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
        }
    }

    fn read_json(path: &Path) -> Result<serde_json::Value> {
        let content = fs::read_to_string(path)
            .map_err(|e| ImageEditError::file_io_error("read model configuration", path, &e))?;
        serde_json::from_str(&content).map_err(|e| {
            ImageEditError::model(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    fn parse_image_size(preprocessor: &serde_json::Value) -> Result<[u32; 2]> {
        let size = preprocessor
            .get("size")
            .ok_or_else(|| ImageEditError::model("Missing size in preprocessor config"))?;

        let dimension = |name: &str| -> Result<u32> {
            size.get(name)
                .and_then(serde_json::Value::as_u64)
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .ok_or_else(|| {
                    ImageEditError::model(format!("Missing or invalid {name} in size config"))
                })
        };

        Ok([dimension("height")?, dimension("width")?])
    }

    /// Parse a 3-channel statistic given in the 0-255 range into 0-1
    fn parse_channels(
        preprocessor: &serde_json::Value,
        key: &str,
        fallback: f64,
    ) -> Result<[f32; 3]> {
        let values = preprocessor
            .get(key)
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| {
                ImageEditError::model(format!("Missing or invalid {key} in preprocessor config"))
            })?;

        if values.len() < 3 {
            return Err(ImageEditError::model(format!(
                "{key} must have at least 3 values"
            )));
        }

        let channel = |index: usize| {
            (values
                .get(index)
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(fallback)
                / 255.0) as f32
        };
        Ok([channel(0), channel(1), channel(2)])
    }
}
