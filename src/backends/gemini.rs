//! Gemini `generateContent` editing capability
//!
//! Sends the composed prompt and the source image as one user turn and splits
//! the candidate parts into images, text and anything else.

use crate::{
    backends::local::{CapabilityResponse, EditingCapability},
    codec::ImageCodec,
    config::LocalEditConfig,
    error::{ImageEditError, Result},
};
use image::ImageFormat;
use log::{debug, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_LOGGED_ERROR_CHARS: usize = 300;

/// Blocking client for the Gemini image model
pub struct GeminiCapability {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiCapability {
    /// Create the client for the configured model
    ///
    /// # Errors
    /// - `Configuration` when no API key is configured
    /// - `Internal` when the HTTP client cannot be built
    pub fn new(config: &LocalEditConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ImageEditError::configuration("GOOGLE_API_KEY is not set"))?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ImageEditError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            endpoint: endpoint_for_model(&config.api_base, &config.model_id),
        })
    }
}

/// `{api_base}/models/{model}:generateContent`, accepting `models/` prefixed ids
fn endpoint_for_model(api_base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{}/{model_path}:generateContent", api_base.trim_end_matches('/'))
}

fn request_payload(prompt: &str, image: &[u8], format: ImageFormat) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inlineData": {
                        "mimeType": ImageCodec::mime_type(format),
                        "data": ImageCodec::encode(image),
                    }
                }
            ]
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        }
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
struct InlineData {
    #[serde(default)]
    data: String,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
}

/// Split a `generateContent` payload into images, texts and unrecognized parts
fn parse_response(payload: &[u8]) -> Result<CapabilityResponse> {
    let parsed: GenerateContentResponse = serde_json::from_slice(payload)
        .map_err(|e| ImageEditError::edit(format!("unreadable Gemini response: {e}")))?;

    let mut response = CapabilityResponse::default();
    let parts = parsed
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts);

    for part in parts {
        match (part.inline_data, part.text) {
            (Some(inline), _) if !inline.data.is_empty() => {
                debug!(
                    "Image part received ({})",
                    inline.mime_type.as_deref().unwrap_or("unknown type")
                );
                let bytes = ImageCodec::decode(&inline.data).map_err(|e| {
                    ImageEditError::edit(format!("Gemini image part is not base64: {e}"))
                })?;
                response.images.push(bytes);
            },
            (_, Some(text)) => response.texts.push(text),
            _ => response.unrecognized_parts += 1,
        }
    }

    Ok(response)
}

impl EditingCapability for GeminiCapability {
    fn name(&self) -> &str {
        "gemini"
    }

    fn edit(&self, prompt: &str, image: &[u8], format: ImageFormat) -> Result<CapabilityResponse> {
        let payload = request_payload(prompt, image, format);

        // The request URL carries the API key, so transport errors are logged without it
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .map_err(|e| {
                warn!("Gemini request failed: {}", e.without_url());
                ImageEditError::edit("Gemini request failed")
            })?;

        let status = response.status();
        let body = response.bytes().map_err(|e| {
            warn!("Gemini response unreadable: {}", e.without_url());
            ImageEditError::edit("Gemini response unreadable")
        })?;

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&body);
            warn!(
                "Gemini returned HTTP {status}: {}",
                detail.chars().take(MAX_LOGGED_ERROR_CHARS).collect::<String>()
            );
            return Err(ImageEditError::edit(format!(
                "Gemini returned HTTP {}",
                status.as_u16()
            )));
        }

        parse_response(&body)
    }
}
