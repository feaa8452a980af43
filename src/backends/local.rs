//! Local edit backend
//!
//! Composes the caller instruction with the sticker style suffix, invokes the
//! editing capability, then removes the background with the segmentation
//! model and re-encodes the first returned image as a transparent PNG.

use crate::{
    background::BackgroundRemover,
    backends::{gemini::GeminiCapability, EditBackend},
    codec::ImageCodec,
    config::LocalEditConfig,
    error::{ImageEditError, Result},
    types::BackendKind,
};
use image::ImageFormat;
use instant::Instant;
use log::{debug, info, warn};
use std::sync::Arc;

/// Suffix appended to every instruction to force a plain-background output
pub const STYLE_SUFFIX: &str = "Create this as a simple sticker-style shape on a pure white background. \
Keep the shape simple and clean, similar to the original drawing, \
with no complex background or details.";

/// Compose the prompt sent to the editing capability
///
/// ```rust
/// use canvas_image_edit::compose_prompt;
///
/// let prompt = compose_prompt("make it blue");
/// assert!(prompt.starts_with("make it blue. Create this as a simple sticker-style shape"));
/// ```
#[must_use]
pub fn compose_prompt(instruction: &str) -> String {
    format!("{instruction}. {STYLE_SUFFIX}")
}

/// Parts returned by one editing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityResponse {
    /// Encoded images in response order
    pub images: Vec<Vec<u8>>,
    /// Text parts (commentary from the model)
    pub texts: Vec<String>,
    /// Parts that were neither text nor inline image data
    pub unrecognized_parts: usize,
}

/// Opaque generative editing capability
pub trait EditingCapability: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run one edit of `image` (encoded as `format`) guided by `prompt`
    ///
    /// # Errors
    /// - Transport or API failures of the underlying service
    fn edit(&self, prompt: &str, image: &[u8], format: ImageFormat) -> Result<CapabilityResponse>;
}

/// Edit backend running the capability from this process
pub struct LocalEditBackend {
    capability: Arc<dyn EditingCapability>,
    remover: Arc<dyn BackgroundRemover>,
}

impl LocalEditBackend {
    /// Fail fast when the capability credentials are missing
    ///
    /// # Errors
    /// - `Configuration` when no API key is configured
    pub fn ensure_configured(config: &LocalEditConfig) -> Result<()> {
        if config.has_api_key() {
            return Ok(());
        }
        warn!("GOOGLE_API_KEY is not set; local image editing is unavailable");
        Err(ImageEditError::configuration("GOOGLE_API_KEY is not set"))
    }

    /// Build the backend from configuration and a loaded background remover
    ///
    /// Blocking: creates the Gemini HTTP client.
    ///
    /// # Errors
    /// - `Configuration` when no API key is configured
    /// - `Internal` when the HTTP client cannot be created
    pub fn from_config(
        config: &LocalEditConfig,
        remover: Arc<dyn BackgroundRemover>,
    ) -> Result<Self> {
        Self::ensure_configured(config)?;

        let capability = GeminiCapability::new(config)?;
        info!("Local edit backend initialized (model {})", config.model_id);

        Ok(Self::with_capability(Arc::new(capability), remover))
    }

    /// Build the backend from explicit collaborators
    pub fn with_capability(
        capability: Arc<dyn EditingCapability>,
        remover: Arc<dyn BackgroundRemover>,
    ) -> Self {
        Self {
            capability,
            remover,
        }
    }

    /// Turn the capability response into a transparent PNG
    fn finish(&self, response: CapabilityResponse) -> Result<Vec<u8>> {
        for text in &response.texts {
            info!("Capability text: {text}");
        }
        if response.unrecognized_parts > 0 {
            warn!(
                "Capability response had {} part(s) that were neither text nor image",
                response.unrecognized_parts
            );
        }

        let Some(image_bytes) = response.images.into_iter().next() else {
            return Err(ImageEditError::NoImageInResponse {
                text_parts: response.texts.len(),
                unrecognized_parts: response.unrecognized_parts,
            });
        };

        let edited = ImageCodec::decode_image(&image_bytes).map_err(|e| {
            ImageEditError::edit(format!("capability returned an undecodable image: {e}"))
        })?;

        debug!("Removing background");
        let transparent = self.remover.remove_background(&edited)?;
        ImageCodec::encode_png(&transparent)
    }
}

impl EditBackend for LocalEditBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn edit(&self, instruction: &str, image: &[u8]) -> Result<Vec<u8>> {
        let start = Instant::now();
        let format = ImageCodec::probe(image)?.format;
        let prompt = compose_prompt(instruction);
        debug!(
            "Local edit via {}: {}",
            self.capability.name(),
            prompt.chars().take(100).collect::<String>()
        );

        let response = self.capability.edit(&prompt, image, format)?;
        let png = self.finish(response)?;

        info!(
            "Local edit completed in {}ms ({} bytes, transparent PNG)",
            start.elapsed().as_millis(),
            png.len()
        );
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::SegmentationRemover;
    use crate::backends::test_utils::{
        sample_png, sticker_png, CenterMaskBackend, ScriptedCapability,
    };
    use crate::error::ErrorKind;
    use image::ColorType;

    fn remover() -> Arc<dyn BackgroundRemover> {
        Arc::new(SegmentationRemover::new(Arc::new(CenterMaskBackend::new(16))))
    }

    fn backend(capability: ScriptedCapability) -> LocalEditBackend {
        LocalEditBackend::with_capability(Arc::new(capability), remover())
    }

    #[test]
    fn test_compose_prompt_is_deterministic() {
        let first = compose_prompt("make it blue");
        let second = compose_prompt("make it blue");
        assert_eq!(first, second);
        assert_eq!(
            first,
            "make it blue. Create this as a simple sticker-style shape on a pure white background. \
             Keep the shape simple and clean, similar to the original drawing, \
             with no complex background or details."
        );
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let result = LocalEditBackend::from_config(&LocalEditConfig::default(), remover());
        let err = result.err().expect("construction must fail without a key");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(LocalEditBackend::ensure_configured(&LocalEditConfig::default()).is_err());
    }

    #[test]
    fn test_edit_returns_transparent_png() {
        let capability = ScriptedCapability::returning(sticker_png());
        let prompts = capability.prompts();
        let backend = backend(capability);

        let png = backend.edit("make it blue", &sample_png(4, 4)).unwrap();

        let decoded = ImageCodec::decode_image(&png).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
        let rgba = decoded.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(4, 4)[3], 255);
        assert_eq!(prompts.lock().unwrap().as_slice(), [compose_prompt("make it blue")]);
    }

    #[test]
    fn test_text_only_response_is_no_image_error() {
        let backend = backend(ScriptedCapability::text_only("I cannot draw that"));
        let err = backend.edit("make it blue", &sample_png(4, 4)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Edit);
        assert!(matches!(
            err,
            ImageEditError::NoImageInResponse {
                text_parts: 1,
                unrecognized_parts: 0
            }
        ));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_capability_failure_propagates() {
        let backend = backend(ScriptedCapability::failing("quota exceeded"));
        let err = backend.edit("make it blue", &sample_png(4, 4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Edit);
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_background_removal_failure_propagates() {
        let backend = LocalEditBackend::with_capability(
            Arc::new(ScriptedCapability::returning(sticker_png())),
            Arc::new(SegmentationRemover::new(Arc::new(CenterMaskBackend::failing(16)))),
        );
        let err = backend.edit("make it blue", &sample_png(4, 4)).unwrap_err();
        assert!(matches!(err, ImageEditError::Inference(_)));
    }

    #[test]
    fn test_undecodable_capability_image_is_edit_error() {
        let backend = backend(ScriptedCapability::returning(b"garbage".to_vec()));
        let err = backend.edit("make it blue", &sample_png(4, 4)).unwrap_err();
        assert!(matches!(err, ImageEditError::Edit(_)));
    }
}
