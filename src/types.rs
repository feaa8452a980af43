//! Request, result and response types shared across the crate

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Where an edit was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Locally-resident editing capability
    Local,
    /// Remote accelerator-backed worker
    Remote,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edit request: an instruction plus the source image bytes
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Correlation id used in logs
    pub id: Uuid,
    /// Caller instruction, not yet composed with any style suffix
    pub instruction: String,
    /// Encoded source image (PNG, JPEG, ...)
    pub source_image: Vec<u8>,
}

impl EditRequest {
    pub fn new<S: Into<String>>(instruction: S, source_image: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            source_image,
        }
    }
}

/// Successful edit: transparent PNG bytes plus provenance
#[derive(Debug, Clone)]
pub struct EditedImage {
    pub png_bytes: Vec<u8>,
    pub backend: BackendKind,
    pub elapsed: Duration,
}

/// Response envelope returned to HTTP callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResponse {
    pub success: bool,
    pub message: String,
    /// Base64-encoded PNG (transparent background)
    #[serde(default)]
    pub image_data: Option<String>,
}

impl EditResponse {
    pub fn success<S: Into<String>>(message: S, image_data: String) -> Self {
        Self {
            success: true,
            message: message.into(),
            image_data: Some(image_data),
        }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
            image_data: None,
        }
    }
}
