//! Error types for image edit dispatch

use std::time::Duration;
use thiserror::Error;

/// Result type alias for image edit operations
pub type Result<T> = std::result::Result<T, ImageEditError>;

/// Caller-facing classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing instruction or image
    Validation,
    /// Remote path failure (absorbed by the dispatcher)
    Remote,
    /// Local editing capability failed or produced no usable image
    Edit,
    /// Local capability unusable because credentials are missing
    Configuration,
    /// Anything outside the classification above
    Unhandled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Remote => "remote",
            Self::Edit => "edit",
            Self::Configuration => "configuration",
            Self::Unhandled => "unhandled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the remote accelerator path
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Remote dispatch is enabled but no endpoint is configured
    #[error("remote target not configured: {0}")]
    NotConfigured(String),

    /// Resolving the `(app, function)` pair failed
    #[error("remote function lookup failed for {app}/{function}: {reason}")]
    Lookup {
        app: String,
        function: String,
        reason: String,
    },

    /// The call did not complete within the configured bound
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// Network or protocol fault talking to the worker
    #[error("remote transport error: {0}")]
    Transport(String),

    /// The worker reported an exception of its own
    #[error("remote worker error: {0}")]
    Worker(String),

    /// The worker answered without image data
    #[error("remote response contained no image")]
    NoImage,

    /// The worker answered with data that is not a usable image
    #[error("malformed remote response: {0}")]
    MalformedResponse(String),

    /// The bounded worker pool was shut down
    #[error("remote worker pool closed")]
    PoolClosed,
}

/// Error types for image edit operations
#[derive(Error, Debug)]
pub enum ImageEditError {
    /// Invalid instruction or image supplied by the caller
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Remote path failure
    #[error("Remote backend error: {0}")]
    Remote(#[from] RemoteError),

    /// Local editing failure
    #[error("Image edit failed: {0}")]
    Edit(String),

    /// The editing capability answered but no part carried an image
    #[error("Image edit failed: no image in response ({text_parts} text part(s), {unrecognized_parts} unrecognized part(s))")]
    NoImageInResponse {
        text_parts: usize,
        unrecognized_parts: usize,
    },

    /// Missing credentials or initialization material
    #[error("Image editing is not configured: {0}")]
    Configuration(String),

    /// Segmentation model download, loading or validation errors
    #[error("Model error: {0}")]
    Model(String),

    /// Segmentation inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Input/output errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImageEditError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new edit error
    pub fn edit<S: Into<String>>(msg: S) -> Self {
        Self::Edit(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Classify this error for the response envelope
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Edit(_) | Self::NoImageInResponse { .. } | Self::Image(_) => ErrorKind::Edit,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Model(_) | Self::Inference(_) | Self::Io(_) | Self::Internal(_) => {
                ErrorKind::Unhandled
            },
        }
    }
}
