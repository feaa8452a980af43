#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Canvas Image Edit
//!
//! Image editing service that turns a drawing plus a text instruction into a
//! sticker-style transparent PNG.
//!
//! The interesting part is where the edit runs. A [`BackendDispatcher`] tries a
//! remote GPU worker first when enabled, bounded by a timeout on a bounded
//! blocking pool, and falls back to the local Gemini backend on any remote
//! failure. Both backends are constructed lazily, once per process, by a
//! [`BackendRegistry`].
//!
//! ## Features
//!
//! - **Remote-first dispatch**: one remote attempt per request, never retried
//! - **Local fallback**: Gemini image model plus ONNX segmentation for background removal
//! - **HTTP API**: multipart upload endpoint compatible with the canvas frontend
//! - **Worker mode**: the same binary serves the remote function contract
//! - **CLI Integration**: `serve` and `worker` subcommands (enable with `cli` feature)
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use canvas_image_edit::{AppState, ServiceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::builder()
//!     .api_key(std::env::var("GOOGLE_API_KEY").ok())
//!     .remote_enabled(false)
//!     .build()?;
//!
//! let outcome = AppState::new(config)
//!     .handler()
//!     .handle("make it blue".to_string(), std::fs::read("drawing.png")?)
//!     .await;
//! println!("{}", outcome.response.message);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command line, `tracing-subscriber` setup
//! - `webp-support` (default): WebP uploads
//! - `tracing-json`: JSON log output

pub mod background;
pub mod backends;
pub mod cache;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod download;
pub mod error;
pub mod handler;
pub mod inference;
pub mod models;
pub mod preprocessing;
pub mod registry;
pub mod server;
pub mod tracing_config;
pub mod types;
pub mod worker;

#[cfg(feature = "cli")]
pub mod cli;

pub use background::{BackgroundRemover, ForegroundMask, SegmentationRemover};
pub use backends::{
    compose_prompt, CapabilityResponse, EditBackend, EditingCapability, FunctionDescriptor,
    FunctionResolver, GeminiCapability, HttpFunctionResolver, LocalEditBackend, RemoteEditBackend,
    RemoteFunction, RemoteInvocation, RemoteInvocationResult, TractBackend,
};
pub use cache::ModelCache;
pub use codec::{ImageCodec, ImageProbe};
pub use config::{
    LocalEditConfig, RemoteTarget, RoutingPolicy, SegmentationModelConfig, ServerConfig,
    ServiceConfig, ServiceConfigBuilder, UploadLimits,
};
pub use dispatcher::BackendDispatcher;
pub use download::ModelDownloader;
pub use error::{ErrorKind, ImageEditError, RemoteError, Result};
pub use handler::{HandlerOutcome, RequestHandler};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, PreprocessingConfig, SegmentationModel};
pub use registry::{BackendFactory, BackendRegistry, DefaultBackendFactory};
pub use server::{AppState, HealthStatus};
pub use types::{BackendKind, EditRequest, EditResponse, EditedImage};
pub use worker::WorkerState;
