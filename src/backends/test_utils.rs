//! Test utilities and stub backends
//!
//! Stubs record every construction and invocation so tests can assert which
//! compute location was touched, and how often.

use crate::{
    backends::{
        local::{CapabilityResponse, EditingCapability},
        EditBackend,
    },
    codec::ImageCodec,
    config::RoutingPolicy,
    error::{ImageEditError, RemoteError, Result},
    inference::InferenceBackend,
    models::PreprocessingConfig,
    registry::BackendFactory,
    types::BackendKind,
};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Small opaque PNG filled with a single blue color
#[must_use]
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([30, 60, 220, 255]));
    ImageCodec::encode_png(&image).unwrap()
}

/// 9x9 red square on a pure white backdrop
#[must_use]
pub fn sticker_png() -> Vec<u8> {
    let mut image = RgbaImage::from_pixel(9, 9, Rgba([255, 255, 255, 255]));
    for y in 2..=6 {
        for x in 2..=6 {
            image.put_pixel(x, y, Rgba([210, 20, 20, 255]));
        }
    }
    ImageCodec::encode_png(&image).unwrap()
}

/// Editing capability answering with a fixed response
pub struct ScriptedCapability {
    response: std::result::Result<CapabilityResponse, String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedCapability {
    pub fn returning(image: Vec<u8>) -> Self {
        Self::with(Ok(CapabilityResponse {
            images: vec![image],
            texts: Vec::new(),
            unrecognized_parts: 0,
        }))
    }

    pub fn text_only(text: &str) -> Self {
        Self::with(Ok(CapabilityResponse {
            images: Vec::new(),
            texts: vec![text.to_string()],
            unrecognized_parts: 0,
        }))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Err(message.to_string()))
    }

    fn with(response: std::result::Result<CapabilityResponse, String>) -> Self {
        Self {
            response,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

impl EditingCapability for ScriptedCapability {
    fn name(&self) -> &str {
        "scripted"
    }

    fn edit(&self, prompt: &str, _image: &[u8], _format: ImageFormat) -> Result<CapabilityResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.response.clone().map_err(ImageEditError::edit)
    }
}

/// Segmentation stub predicting the central half of its square input as foreground
///
/// The prediction ignores pixel colours, like a model that recognises a
/// subject by shape.
pub struct CenterMaskBackend {
    preprocessing: PreprocessingConfig,
    fail: bool,
    calls: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl CenterMaskBackend {
    pub fn new(size: u32) -> Self {
        Self {
            preprocessing: PreprocessingConfig {
                target_size: [size, size],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(size: u32) -> Self {
        Self {
            fail: true,
            ..Self::new(size)
        }
    }

    /// Input shapes received so far
    pub fn calls(&self) -> Arc<Mutex<Vec<Vec<usize>>>> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for CenterMaskBackend {
    fn name(&self) -> &str {
        "center-mask"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.lock().unwrap().push(input.shape().to_vec());
        if self.fail {
            return Err(ImageEditError::inference("stub inference failed"));
        }

        let [height, width] = self.preprocessing.target_size.map(|v| v as usize);
        Ok(Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let inside = (height / 4..height * 3 / 4).contains(&y)
                && (width / 4..width * 3 / 4).contains(&x);
            if inside {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }
}

/// What a stub backend does when invoked
#[derive(Debug, Clone)]
pub enum StubBehavior {
    Succeed(Vec<u8>),
    SucceedAfter(Duration, Vec<u8>),
    Fail(String),
    NoImage,
    Panic,
}

/// Edit backend with scripted behavior and a shared call counter
#[derive(Debug, Clone)]
pub struct StubBackend {
    kind: BackendKind,
    behavior: StubBehavior,
    calls: Arc<AtomicUsize>,
    instructions: Arc<Mutex<Vec<String>>>,
}

impl StubBackend {
    pub fn new(kind: BackendKind, behavior: StubBehavior) -> Self {
        Self {
            kind,
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
            instructions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend returning a valid PNG
    pub fn succeeding(kind: BackendKind) -> Self {
        Self::new(kind, StubBehavior::Succeed(sample_png(2, 2)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

impl EditBackend for StubBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn edit(&self, instruction: &str, _image: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .unwrap()
            .push(instruction.to_string());

        match &self.behavior {
            StubBehavior::Succeed(bytes) => Ok(bytes.clone()),
            StubBehavior::SucceedAfter(delay, bytes) => {
                std::thread::sleep(*delay);
                Ok(bytes.clone())
            },
            StubBehavior::Fail(message) => Err(match self.kind {
                BackendKind::Remote => RemoteError::Worker(message.clone()).into(),
                BackendKind::Local => ImageEditError::edit(message.clone()),
            }),
            StubBehavior::NoImage => Err(match self.kind {
                BackendKind::Remote => RemoteError::NoImage.into(),
                BackendKind::Local => ImageEditError::NoImageInResponse {
                    text_parts: 1,
                    unrecognized_parts: 0,
                },
            }),
            StubBehavior::Panic => panic!("stub {} backend panicked", self.kind),
        }
    }
}

/// Backend factory handing out stub backends and counting constructions
#[derive(Debug, Clone)]
pub struct StubFactory {
    local: Option<StubBackend>,
    remote: Option<StubBackend>,
    local_creations: Arc<AtomicUsize>,
    remote_creations: Arc<AtomicUsize>,
    local_failures_remaining: Arc<AtomicUsize>,
    creation_delay: Duration,
    remote_creation_delay: Duration,
}

impl StubFactory {
    /// `None` makes the corresponding construction fail
    pub fn new(local: Option<StubBackend>, remote: Option<StubBackend>) -> Self {
        Self {
            local,
            remote,
            local_creations: Arc::new(AtomicUsize::new(0)),
            remote_creations: Arc::new(AtomicUsize::new(0)),
            local_failures_remaining: Arc::new(AtomicUsize::new(0)),
            creation_delay: Duration::ZERO,
            remote_creation_delay: Duration::ZERO,
        }
    }

    /// Delay every construction, widening the window for concurrent callers
    #[must_use]
    pub fn with_creation_delay(mut self, delay: Duration) -> Self {
        self.creation_delay = delay;
        self
    }

    /// Delay remote constructions only, like a lookup that hangs
    #[must_use]
    pub fn with_remote_creation_delay(mut self, delay: Duration) -> Self {
        self.remote_creation_delay = delay;
        self
    }

    /// Fail the first `count` local constructions
    #[must_use]
    pub fn failing_local_creations(self, count: usize) -> Self {
        self.local_failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub fn local_creations(&self) -> usize {
        self.local_creations.load(Ordering::SeqCst)
    }

    pub fn remote_creations(&self) -> usize {
        self.remote_creations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendFactory for StubFactory {
    async fn create_local(&self) -> Result<Arc<dyn EditBackend>> {
        self.local_creations.fetch_add(1, Ordering::SeqCst);
        if !self.creation_delay.is_zero() {
            tokio::time::sleep(self.creation_delay).await;
        }

        let pending_failure = self
            .local_failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending_failure {
            return Err(ImageEditError::configuration("stub local construction failed"));
        }

        match &self.local {
            Some(backend) => Ok(Arc::new(backend.clone())),
            None => Err(ImageEditError::configuration("GOOGLE_API_KEY is not set")),
        }
    }

    async fn create_remote(&self, policy: &RoutingPolicy) -> Result<Arc<dyn EditBackend>> {
        self.remote_creations.fetch_add(1, Ordering::SeqCst);
        let delay = self.creation_delay + self.remote_creation_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &self.remote {
            Some(backend) => Ok(Arc::new(backend.clone())),
            None => Err(RemoteError::Lookup {
                app: policy.target.app_name.clone(),
                function: policy.target.function_name.clone(),
                reason: "stub lookup failed".to_string(),
            }
            .into()),
        }
    }
}
