//! Configuration types for the image edit service
//!
//! All configuration is an immutable snapshot taken at process start. The
//! binary assembles it from CLI flags and environment variables; tests build
//! it directly through [`ServiceConfig::builder`].

use crate::error::{ImageEditError, Result};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash-image";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REMOTE_APP: &str = "canvas-sync-gpu-worker";
pub const DEFAULT_REMOTE_FUNCTION: &str = "generate_image_edit";
pub const DEFAULT_SEGMENTATION_MODEL_URL: &str = "https://huggingface.co/imgly/isnet-general-onnx";
pub const DEFAULT_SEGMENTATION_VARIANT: &str = "fp32";
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5173"];

/// Identity of the remote function that performs edits on a GPU worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    /// Application the function is deployed under
    pub app_name: String,
    /// Function name inside the application
    pub function_name: String,
    /// Base URL of the worker platform (None = remote path unusable)
    pub endpoint: Option<String>,
}

impl Default for RemoteTarget {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_REMOTE_APP.to_string(),
            function_name: DEFAULT_REMOTE_FUNCTION.to_string(),
            endpoint: None,
        }
    }
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.app_name, self.function_name)
    }
}

/// Static routing policy consulted by the dispatcher on every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Try the remote worker before the local backend
    pub remote_enabled: bool,
    /// Upper bound for one remote attempt, pool wait included (milliseconds)
    pub remote_timeout_ms: u64,
    /// Remote function identity
    pub target: RemoteTarget,
    /// Size of the blocking pool used for remote calls
    pub max_in_flight: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            remote_timeout_ms: 120_000,
            target: RemoteTarget::default(),
            max_in_flight: 4,
        }
    }
}

impl RoutingPolicy {
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

/// Segmentation model used to cut edited images out of their backdrop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationModelConfig {
    /// Model repository URL (`HuggingFace` layout: `{url}/resolve/main/{file}`)
    pub model_url: String,
    /// ONNX variant to load (fp32, fp16, ...)
    pub variant: String,
    /// Cache directory override; None uses the platform cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for SegmentationModelConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_SEGMENTATION_MODEL_URL.to_string(),
            variant: DEFAULT_SEGMENTATION_VARIANT.to_string(),
            cache_dir: None,
        }
    }
}

/// Settings for the locally-resident editing capability
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEditConfig {
    /// API credential; absence makes the local backend unusable
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    /// Generative model identifier
    pub model_id: String,
    /// Base URL of the generative API
    pub api_base: String,
    /// Request timeout for one edit call (milliseconds)
    pub request_timeout_ms: u64,
    /// Background removal model
    #[serde(default)]
    pub segmentation: SegmentationModelConfig,
}

impl Default for LocalEditConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_ms: 120_000,
            segmentation: SegmentationModelConfig::default(),
        }
    }
}

impl LocalEditConfig {
    /// Whether a non-blank credential is present
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl std::fmt::Debug for LocalEditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEditConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_id", &self.model_id)
            .field("api_base", &self.api_base)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("segmentation", &self.segmentation)
            .finish()
    }
}

/// Limits applied to uploaded source images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Maximum accepted image size in bytes
    pub max_image_bytes: usize,
    /// Accepted image types as file extensions (jpeg, jpg, png, webp, ...)
    pub allowed_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            allowed_types: ["jpeg", "jpg", "png", "webp"]
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }
}

impl UploadLimits {
    /// Resolve the configured extensions into image formats
    ///
    /// Unknown extensions are ignored; `validate` rejects a list where
    /// nothing resolves.
    #[must_use]
    pub fn allowed_formats(&self) -> Vec<ImageFormat> {
        let mut formats: Vec<ImageFormat> = self
            .allowed_types
            .iter()
            .filter_map(|ext| ImageFormat::from_extension(ext.trim().to_ascii_lowercase()))
            .collect();
        formats.dedup();
        formats
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by CORS; `*` mirrors any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: DEFAULT_CORS_ORIGINS
                .iter()
                .map(|origin| (*origin).to_string())
                .collect(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub limits: UploadLimits,
    pub local: LocalEditConfig,
    pub routing: RoutingPolicy,
}

impl ServiceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero remote timeout or worker pool size
    /// - Zero upload limit or no recognised image type
    /// - Empty remote target identity while remote dispatch is enabled
    /// - A CORS origin that is not a valid header value
    /// - Empty segmentation model URL or variant
    pub fn validate(&self) -> Result<()> {
        if self.routing.remote_timeout_ms == 0 {
            return Err(ImageEditError::configuration(
                "remote timeout must be greater than zero",
            ));
        }
        if self.routing.max_in_flight == 0 {
            return Err(ImageEditError::configuration(
                "remote worker pool needs at least one slot",
            ));
        }
        if self.routing.remote_enabled
            && (self.routing.target.app_name.trim().is_empty()
                || self.routing.target.function_name.trim().is_empty())
        {
            return Err(ImageEditError::configuration(
                "remote app and function names must not be empty",
            ));
        }
        if self.limits.max_image_bytes == 0 {
            return Err(ImageEditError::configuration(
                "maximum image size must be greater than zero",
            ));
        }
        if self.limits.allowed_formats().is_empty() {
            return Err(ImageEditError::configuration(format!(
                "no supported image type in {:?}",
                self.limits.allowed_types
            )));
        }
        if self.local.request_timeout_ms == 0 {
            return Err(ImageEditError::configuration(
                "edit request timeout must be greater than zero",
            ));
        }
        if self.local.segmentation.model_url.trim().is_empty()
            || self.local.segmentation.variant.trim().is_empty()
        {
            return Err(ImageEditError::configuration(
                "segmentation model URL and variant must not be empty",
            ));
        }
        if let Some(origin) = self
            .server
            .cors_origins
            .iter()
            .find(|origin| axum::http::HeaderValue::from_str(origin).is_err())
        {
            return Err(ImageEditError::configuration(format!(
                "invalid CORS origin: {origin:?}"
            )));
        }
        Ok(())
    }
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    #[must_use]
    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.server.cors_origins = origins
            .into_iter()
            .map(|origin| origin.into().trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn api_key(mut self, api_key: Option<String>) -> Self {
        self.config.local.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    #[must_use]
    pub fn model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.config.local.model_id = model_id.into();
        self
    }

    #[must_use]
    pub fn api_base<S: Into<String>>(mut self, api_base: S) -> Self {
        self.config.local.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn edit_timeout(mut self, timeout: Duration) -> Self {
        self.config.local.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn segmentation_model_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.local.segmentation.model_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn segmentation_variant<S: Into<String>>(mut self, variant: S) -> Self {
        self.config.local.segmentation.variant = variant.into();
        self
    }

    #[must_use]
    pub fn model_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.config.local.segmentation.cache_dir = cache_dir;
        self
    }

    #[must_use]
    pub fn max_image_mb(mut self, megabytes: usize) -> Self {
        self.config.limits.max_image_bytes = megabytes.saturating_mul(1024 * 1024);
        self
    }

    #[must_use]
    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.config.limits.max_image_bytes = bytes;
        self
    }

    #[must_use]
    pub fn allowed_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.limits.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn remote_enabled(mut self, enabled: bool) -> Self {
        self.config.routing.remote_enabled = enabled;
        self
    }

    #[must_use]
    pub fn remote_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.config.routing.target.endpoint = endpoint
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        self
    }

    #[must_use]
    pub fn remote_app<S: Into<String>>(mut self, app_name: S) -> Self {
        self.config.routing.target.app_name = app_name.into();
        self
    }

    #[must_use]
    pub fn remote_function<S: Into<String>>(mut self, function_name: S) -> Self {
        self.config.routing.target.function_name = function_name.into();
        self
    }

    #[must_use]
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.config.routing.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn max_in_flight(mut self, slots: usize) -> Self {
        self.config.routing.max_in_flight = slots;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// See [`ServiceConfig::validate`].
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
