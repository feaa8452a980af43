//! On-disk cache for the segmentation model
//!
//! Models live under `<cache>/models/<model_id>/` in `HuggingFace` layout:
//! `config.json`, `preprocessor_config.json` and one or more ONNX variants in
//! `onnx/`.

use crate::error::{ImageEditError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_CACHE_DIR: &str = "canvas-image-edit";

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the cache, creating its directory when missing
    ///
    /// With `root` set the cache lives in `<root>/models`, otherwise in the
    /// platform cache directory (`~/.cache/canvas-image-edit/models` on Linux).
    ///
    /// # Errors
    /// - No platform cache directory and no override
    /// - Failed to create the cache directory
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let cache_dir = match root {
            Some(root) => root.join("models"),
            None => dirs::cache_dir()
                .ok_or_else(|| {
                    ImageEditError::configuration(
                        "Failed to determine cache directory. Set MODEL_CACHE_DIR.",
                    )
                })?
                .join(APP_CACHE_DIR)
                .join("models"),
        };

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                ImageEditError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    /// Generate a filesystem-safe model ID from a URL
    ///
    /// ```
    /// use canvas_image_edit::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx");
    /// assert_eq!(id, "imgly--isnet-general-onnx");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(path) = url.strip_prefix(prefix) {
            path.trim_end_matches('/').replace('/', "--")
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// File name of an ONNX variant inside `onnx/`
    #[must_use]
    pub fn variant_file_name(variant: &str) -> String {
        match variant {
            "fp32" => "model.onnx".to_string(),
            "fp16" => "model_fp16.onnx".to_string(),
            other => format!("model_{other}.onnx"),
        }
    }

    /// Whether the model directory is complete for `variant`
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str, variant: &str) -> bool {
        let model_path = self.model_path(model_id);
        Self::validate_model_directory(&model_path)
            && model_path
                .join("onnx")
                .join(Self::variant_file_name(variant))
                .is_file()
    }

    /// Path of a model directory (may not exist)
    #[must_use]
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// ONNX variants present in a model directory, sorted
    #[must_use]
    pub fn available_variants(model_path: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(model_path.join("onnx")) else {
            return Vec::new();
        };

        let mut variants: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter_map(|file_name| match file_name.as_str() {
                "model.onnx" => Some("fp32".to_string()),
                _ => file_name
                    .strip_prefix("model_")
                    .and_then(|s| s.strip_suffix(".onnx"))
                    .map(str::to_string),
            })
            .collect();
        variants.sort();
        variants
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn validate_model_directory(model_path: &Path) -> bool {
        model_path.join("config.json").is_file()
            && model_path.join("preprocessor_config.json").is_file()
            && model_path.join("onnx").is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_url_to_model_id() {
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx"),
            "imgly--isnet-general-onnx"
        );
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/org/model/"),
            "org--model"
        );

        let hashed = ModelCache::url_to_model_id("http://127.0.0.1:9000/org/model");
        assert!(hashed.starts_with("url-"));
        assert_eq!(hashed.len(), 16);
        assert_eq!(
            hashed,
            ModelCache::url_to_model_id("http://127.0.0.1:9000/org/model")
        );
        assert_ne!(
            hashed,
            ModelCache::url_to_model_id("http://127.0.0.1:9001/org/model")
        );
    }

    #[test]
    fn test_custom_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(Some(temp_dir.path())).unwrap();

        assert!(temp_dir.path().join("models").is_dir());
        assert_eq!(cache.cache_dir(), temp_dir.path().join("models"));
        assert_eq!(
            cache.model_path("org--model"),
            temp_dir.path().join("models").join("org--model")
        );
    }

    #[test]
    fn test_is_model_cached_requires_variant_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(Some(temp_dir.path())).unwrap();
        let model_path = cache.model_path("test-model");

        assert!(!cache.is_model_cached("test-model", "fp32"));

        fs::create_dir_all(model_path.join("onnx")).unwrap();
        fs::write(model_path.join("config.json"), "{}").unwrap();
        fs::write(model_path.join("preprocessor_config.json"), "{}").unwrap();
        assert!(!cache.is_model_cached("test-model", "fp32"));

        fs::write(model_path.join("onnx").join("model_fp16.onnx"), b"onnx").unwrap();
        assert!(cache.is_model_cached("test-model", "fp16"));
        assert!(!cache.is_model_cached("test-model", "fp32"));
    }

    #[test]
    fn test_available_variants() {
        let temp_dir = TempDir::new().unwrap();
        let onnx_dir = temp_dir.path().join("onnx");
        fs::create_dir_all(&onnx_dir).unwrap();
        for name in ["model.onnx", "model_fp16.onnx", "model_quantized.onnx", "notes.txt"] {
            fs::write(onnx_dir.join(name), b"x").unwrap();
        }

        assert_eq!(
            ModelCache::available_variants(temp_dir.path()),
            vec!["fp16", "fp32", "quantized"]
        );
        assert!(ModelCache::available_variants(&temp_dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_variant_file_names() {
        assert_eq!(ModelCache::variant_file_name("fp32"), "model.onnx");
        assert_eq!(ModelCache::variant_file_name("fp16"), "model_fp16.onnx");
        assert_eq!(ModelCache::variant_file_name("int8"), "model_int8.onnx");
    }
}
