//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use canvas_image_edit::{
    BackendFactory, CapabilityResponse, EditBackend, EditingCapability, FunctionResolver,
    HttpFunctionResolver, ImageCodec, ImageEditError, InferenceBackend, LocalEditBackend,
    PreprocessingConfig, RemoteEditBackend, RemoteError, Result, RoutingPolicy,
    SegmentationRemover,
};
use image::{ImageFormat, Rgba, RgbaImage};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Small opaque PNG
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([40, 80, 200, 255]));
    ImageCodec::encode_png(&image).unwrap()
}

/// Blue disc-like square on a pure white backdrop
pub fn sticker_png() -> Vec<u8> {
    let mut image = RgbaImage::from_pixel(12, 12, Rgba([255, 255, 255, 255]));
    for y in 3..9 {
        for x in 3..9 {
            image.put_pixel(x, y, Rgba([20, 40, 230, 255]));
        }
    }
    ImageCodec::encode_png(&image).unwrap()
}

/// Editing capability that answers with a sticker or with text only
pub struct StubCapability {
    text_only: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubCapability {
    pub fn sticker() -> Arc<Self> {
        Arc::new(Self {
            text_only: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn text_only() -> Arc<Self> {
        Arc::new(Self {
            text_only: true,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl EditingCapability for StubCapability {
    fn name(&self) -> &str {
        "stub"
    }

    fn edit(&self, prompt: &str, _image: &[u8], _format: ImageFormat) -> Result<CapabilityResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.text_only {
            return Ok(CapabilityResponse {
                images: Vec::new(),
                texts: vec!["I can only describe this drawing".to_string()],
                unrecognized_parts: 0,
            });
        }
        Ok(CapabilityResponse {
            images: vec![sticker_png()],
            texts: Vec::new(),
            unrecognized_parts: 0,
        })
    }
}

/// Segmentation model stand-in: the central half of the input is foreground
pub struct CenterSegmentation {
    preprocessing: PreprocessingConfig,
}

impl CenterSegmentation {
    pub fn new() -> Self {
        Self {
            preprocessing: PreprocessingConfig {
                target_size: [16, 16],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl InferenceBackend for CenterSegmentation {
    fn name(&self) -> &str {
        "center"
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let shape = input.shape();
        let (height, width) = (shape[2], shape[3]);
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

/// Local backend on a stub capability; remote over HTTP when enabled
pub struct TestFactory {
    capability: Arc<StubCapability>,
    pub local_creations: AtomicUsize,
    pub remote_creations: AtomicUsize,
}

impl TestFactory {
    pub fn new(capability: Arc<StubCapability>) -> Arc<Self> {
        Arc::new(Self {
            capability,
            local_creations: AtomicUsize::new(0),
            remote_creations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BackendFactory for TestFactory {
    async fn create_local(&self) -> Result<Arc<dyn EditBackend>> {
        self.local_creations.fetch_add(1, Ordering::SeqCst);
        let capability: Arc<dyn EditingCapability> = self.capability.clone();
        let remover = SegmentationRemover::new(Arc::new(CenterSegmentation::new()));
        Ok(Arc::new(LocalEditBackend::with_capability(
            capability,
            Arc::new(remover),
        )))
    }

    async fn create_remote(&self, policy: &RoutingPolicy) -> Result<Arc<dyn EditBackend>> {
        self.remote_creations.fetch_add(1, Ordering::SeqCst);
        if policy.target.endpoint.is_none() {
            return Err(RemoteError::NotConfigured("no endpoint".to_string()).into());
        }

        let target = policy.target.clone();
        let timeout = policy.remote_timeout();
        let backend = tokio::task::spawn_blocking(move || {
            RemoteEditBackend::connect(&HttpFunctionResolver as &dyn FunctionResolver, &target, timeout)
        })
        .await
        .map_err(|e| ImageEditError::internal(e.to_string()))??;
        Ok(Arc::new(backend))
    }
}

/// Decode a base64 PNG and return it as RGBA
pub fn decode_png(data: &str) -> RgbaImage {
    let bytes = ImageCodec::decode(data).unwrap();
    let probe = ImageCodec::probe(&bytes).unwrap();
    assert_eq!(probe.format, ImageFormat::Png);
    ImageCodec::decode_image(&bytes).unwrap().to_rgba8()
}

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn_router(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{address}")
}
