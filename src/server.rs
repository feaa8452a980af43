//! HTTP front end
//!
//! Routes:
//! - `GET /` service banner
//! - `GET /health` configuration and backend readiness
//! - `POST /api/generate/image-to-image` multipart `prompt` + `image`
//!
//! Browser clients are admitted through CORS for the configured origins, with
//! credentials allowed.

use crate::{
    config::{ServerConfig, ServiceConfig},
    dispatcher::BackendDispatcher,
    error::{ErrorKind, Result},
    handler::RequestHandler,
    registry::{BackendFactory, BackendRegistry, DefaultBackendFactory},
    types::EditResponse,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

pub const SERVICE_NAME: &str = "AI Image Generation Service";
pub const EDIT_ROUTE: &str = "/api/generate/image-to-image";

/// Multipart framing allowance on top of the image size limit
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared state of the HTTP service
#[derive(Clone)]
pub struct AppState {
    handler: RequestHandler,
    config: Arc<ServiceConfig>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// State backed by the Gemini local backend and the HTTP remote resolver
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let factory = DefaultBackendFactory::new(config.local.clone());
        Self::with_factory(config, Arc::new(factory))
    }

    /// State with an injected backend factory
    #[must_use]
    pub fn with_factory(config: ServiceConfig, factory: Arc<dyn BackendFactory>) -> Self {
        let registry = Arc::new(BackendRegistry::new(factory));
        let dispatcher = BackendDispatcher::new(
            registry,
            config.routing.clone(),
            config.limits.clone(),
        );
        Self {
            handler: RequestHandler::new(Arc::new(dispatcher)),
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }
}

/// Health report served on `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub api_key_configured: bool,
    pub model: String,
    pub remote_enabled: bool,
    pub local_backend_ready: bool,
    pub remote_backend_ready: bool,
    pub started_at: DateTime<Utc>,
}

/// Status code for a handler outcome
#[must_use]
pub fn status_for(kind: Option<ErrorKind>) -> StatusCode {
    match kind {
        None => StatusCode::OK,
        Some(ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::Configuration) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorKind::Edit | ErrorKind::Remote | ErrorKind::Unhandled) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

/// CORS policy for the configured origins
///
/// Methods and headers are mirrored from the preflight request so that
/// credentials can be allowed; `*` mirrors any origin.
#[must_use]
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let allow_origin = if config.cors_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {origin:?}");
                    None
                },
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .limits
        .max_image_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(EDIT_ROUTE, post(image_to_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let registry = state.handler.dispatcher().registry();
    Json(HealthStatus {
        status: "healthy",
        api_key_configured: state.config.local.has_api_key(),
        model: state.config.local.model_id.clone(),
        remote_enabled: state.config.routing.remote_enabled,
        local_backend_ready: registry.is_local_initialized(),
        remote_backend_ready: registry.is_remote_initialized(),
        started_at: state.started_at,
    })
}

async fn image_to_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<EditResponse>) {
    let mut prompt = String::new();
    let mut image = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Rejected multipart body: {e}");
                return (
                    e.status(),
                    Json(EditResponse::failure(format!("Invalid request: {}", e.body_text()))),
                );
            },
        };

        let name = field.name().unwrap_or_default().to_string();
        let read = match name.as_str() {
            "prompt" => field.text().await.map(|text| prompt = text),
            "image" => {
                if let Some(file_name) = field.file_name() {
                    info!("Image upload received: {file_name}");
                }
                field.bytes().await.map(|bytes| image = bytes.to_vec())
            },
            _ => Ok(()),
        };
        if let Err(e) = read {
            warn!("Failed to read multipart field {name}: {e}");
            return (
                e.status(),
                Json(EditResponse::failure(format!("Invalid request: {}", e.body_text()))),
            );
        }
    }

    let outcome = state.handler.handle(prompt, image).await;
    (status_for(outcome.kind), Json(outcome.response))
}

/// Resolves when the process receives Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Bind and serve until Ctrl-C
///
/// On shutdown the remote pool is closed first, so requests still in flight
/// finish on the local backend instead of queueing for a worker slot.
///
/// # Errors
/// - Invalid configuration
/// - Bind or accept failures
pub async fn serve(config: ServiceConfig) -> Result<()> {
    config.validate()?;
    let address = config.server.bind_address();

    if !config.local.has_api_key() {
        warn!("GOOGLE_API_KEY is not set; edits will fail until it is configured");
    }
    if config.routing.remote_enabled {
        info!(
            "Remote dispatch enabled for {} (timeout {:?}, {} slot(s))",
            config.routing.target,
            config.routing.remote_timeout(),
            config.routing.max_in_flight
        );
    }

    let state = AppState::new(config);
    let dispatcher = Arc::clone(state.handler().dispatcher());
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(address.as_str()).await?;
    info!("Listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            dispatcher.close_remote_pool();
        })
        .await?;
    info!("Server stopped");
    Ok(())
}
