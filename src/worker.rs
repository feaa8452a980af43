//! Remote worker service
//!
//! Serves the function contract that [`HttpFunctionResolver`] speaks, running
//! the local backend on the worker host. A worker never dispatches remotely.
//!
//! [`HttpFunctionResolver`]: crate::backends::HttpFunctionResolver

use crate::{
    backends::{FunctionDescriptor, RemoteInvocation, RemoteInvocationResult},
    codec::ImageCodec,
    config::{RemoteTarget, ServiceConfig},
    error::{ErrorKind, ImageEditError, Result},
    registry::{BackendFactory, BackendRegistry, DefaultBackendFactory},
    server::shutdown_signal,
};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use instant::Instant;
use log::{error, info, warn};
use std::sync::Arc;

/// Shared state of the worker service
#[derive(Clone)]
pub struct WorkerState {
    target: Arc<RemoteTarget>,
    registry: Arc<BackendRegistry>,
}

impl WorkerState {
    #[must_use]
    pub fn new(config: &ServiceConfig) -> Self {
        let factory = DefaultBackendFactory::new(config.local.clone());
        Self::with_factory(config.routing.target.clone(), Arc::new(factory))
    }

    #[must_use]
    pub fn with_factory(target: RemoteTarget, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            target: Arc::new(target),
            registry: Arc::new(BackendRegistry::new(factory)),
        }
    }

    fn serves(&self, app: &str, function: &str) -> bool {
        self.target.app_name == app && self.target.function_name == function
    }

    /// Run one edit on the local backend
    async fn run(&self, invocation: RemoteInvocation) -> Result<Vec<u8>> {
        let image = ImageCodec::decode(&invocation.image_b64)?;
        if invocation.instruction.trim().is_empty() {
            return Err(ImageEditError::validation("instruction must not be empty"));
        }

        let backend = self.registry.local().await?;
        tokio::task::spawn_blocking(move || backend.edit(&invocation.instruction, &image))
            .await
            .map_err(|e| ImageEditError::internal(format!("worker edit task failed: {e}")))?
    }
}

pub fn router(state: WorkerState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/apps/{app}/functions/{function}", get(describe))
        .route("/apps/{app}/functions/{function}/invoke", post(invoke))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn describe(
    State(state): State<WorkerState>,
    Path((app, function)): Path<(String, String)>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !state.serves(&app, &function) {
        warn!("Lookup for unknown function {app}/{function}");
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("function {app}/{function} not found") })),
        );
    }

    let descriptor = FunctionDescriptor::for_target(&app, &function);
    match serde_json::to_value(descriptor) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

async fn invoke(
    State(state): State<WorkerState>,
    Path((app, function)): Path<(String, String)>,
    Json(invocation): Json<RemoteInvocation>,
) -> (StatusCode, Json<RemoteInvocationResult>) {
    if !state.serves(&app, &function) {
        return (
            StatusCode::NOT_FOUND,
            Json(RemoteInvocationResult::error(format!(
                "function {app}/{function} not found"
            ))),
        );
    }

    let start = Instant::now();
    match state.run(invocation).await {
        Ok(png_bytes) => {
            info!(
                "Remote edit served in {}ms ({} bytes)",
                start.elapsed().as_millis(),
                png_bytes.len()
            );
            (StatusCode::OK, Json(RemoteInvocationResult::image(&png_bytes)))
        },
        Err(e) => {
            error!("Remote edit failed: {e}");
            let status = match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(RemoteInvocationResult::error(e.to_string())))
        },
    }
}

/// Serve the worker contract until Ctrl-C
///
/// # Errors
/// - Invalid configuration
/// - Bind or accept failures
pub async fn serve(config: ServiceConfig) -> Result<()> {
    config.validate()?;
    if !config.local.has_api_key() {
        warn!("GOOGLE_API_KEY is not set; invocations will fail until it is configured");
    }

    let address = config.server.bind_address();
    // base64 inflates the payload by a third
    let max_body_bytes = config.limits.max_image_bytes.saturating_mul(2);
    let app = router(WorkerState::new(&config), max_body_bytes);

    let listener = tokio::net::TcpListener::bind(address.as_str()).await?;
    info!(
        "Worker for {} listening on {address}",
        config.routing.target
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Worker stopped");
    Ok(())
}
