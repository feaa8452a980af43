//! Edit backends
//!
//! Two implementations of the same logical operation:
//! - Local backend (generative API called from this process, background removal applied here)
//! - Remote backend (function running on an accelerator worker, reached over HTTP)
//!
//! The Tract backend runs the segmentation model behind background removal.

use crate::{error::Result, types::BackendKind};

pub mod gemini;
pub mod local;
pub mod remote;
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::gemini::GeminiCapability;
pub use self::local::{compose_prompt, CapabilityResponse, EditingCapability, LocalEditBackend};
pub use self::remote::{
    FunctionDescriptor, FunctionResolver, HttpFunctionResolver, RemoteEditBackend,
    RemoteFunction, RemoteInvocation, RemoteInvocationResult,
};
pub use self::tract::TractBackend;

/// Trait for edit backends
///
/// Calls are blocking; the dispatcher runs them on the blocking pool.
pub trait EditBackend: Send + Sync {
    /// Which compute location this backend represents
    fn kind(&self) -> BackendKind;

    /// Apply `instruction` to the encoded `image`, returning edited image bytes
    ///
    /// # Errors
    /// - Local backend: edit, no-image or configuration errors
    /// - Remote backend: `ImageEditError::Remote` for every failure
    fn edit(&self, instruction: &str, image: &[u8]) -> Result<Vec<u8>>;
}
