//! Compute-location dispatch with remote-first fallback
//!
//! Every request makes at most one remote attempt. The attempt runs on the
//! blocking pool behind a semaphore sized by the routing policy, and the
//! timeout covers both the wait for a pool slot and the call itself. Any
//! remote failure is logged and replaced by a local attempt; local failures
//! are the request's result.

use crate::{
    backends::EditBackend,
    codec::{ImageCodec, ImageProbe},
    config::{RoutingPolicy, UploadLimits},
    error::{ImageEditError, RemoteError, Result},
    registry::BackendRegistry,
    types::{BackendKind, EditRequest, EditedImage},
};
use image::ImageFormat;
use instant::Instant;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Span};

/// Routes edit requests to the remote worker or the local backend
pub struct BackendDispatcher {
    registry: Arc<BackendRegistry>,
    policy: RoutingPolicy,
    limits: UploadLimits,
    allowed_formats: Vec<ImageFormat>,
    remote_pool: Arc<Semaphore>,
}

impl BackendDispatcher {
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>, policy: RoutingPolicy, limits: UploadLimits) -> Self {
        let allowed_formats = limits.allowed_formats();
        let remote_pool = Arc::new(Semaphore::new(policy.max_in_flight.max(1)));
        Self {
            registry,
            policy,
            limits,
            allowed_formats,
            remote_pool,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Stop admitting remote calls; later requests go straight to the local backend
    ///
    /// Calls already holding a pool slot run to completion.
    pub fn close_remote_pool(&self) {
        if !self.remote_pool.is_closed() {
            info!("Closing remote worker pool");
            self.remote_pool.close();
        }
    }

    /// Check the request preconditions without touching any backend
    ///
    /// # Errors
    /// `Validation` for an empty instruction, an empty or oversized image, an
    /// unreadable image or a format outside the allowed list.
    pub fn validate(&self, instruction: &str, image: &[u8]) -> Result<ImageProbe> {
        if instruction.trim().is_empty() {
            return Err(ImageEditError::validation("instruction must not be empty"));
        }
        if image.is_empty() {
            return Err(ImageEditError::validation("image must not be empty"));
        }
        if image.len() > self.limits.max_image_bytes {
            return Err(ImageEditError::validation(format!(
                "image is {} bytes, limit is {} bytes",
                image.len(),
                self.limits.max_image_bytes
            )));
        }

        let probe = ImageCodec::probe(image)?;
        if !self.allowed_formats.contains(&probe.format) {
            return Err(ImageEditError::validation(format!(
                "image type {} is not allowed (allowed: {})",
                ImageCodec::mime_type(probe.format),
                self.limits.allowed_types.join(", ")
            )));
        }
        Ok(probe)
    }

    /// Edit the request's image, remote first when enabled
    ///
    /// # Errors
    /// - `Validation` before any backend is touched
    /// - Local backend failures (`Configuration`, `Edit`, ...)
    ///
    /// Remote failures never surface here.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(request_id = %request.id, backend = tracing::field::Empty)
    )]
    pub async fn dispatch(&self, request: EditRequest) -> Result<EditedImage> {
        let start = Instant::now();
        let probe = self.validate(&request.instruction, &request.source_image)?;
        debug!(
            width = probe.width,
            height = probe.height,
            format = ImageCodec::mime_type(probe.format),
            "Request validated"
        );

        if self.policy.remote_enabled {
            match self.try_remote(&request).await {
                Ok(png_bytes) => return Ok(self.finish(png_bytes, BackendKind::Remote, start)),
                Err(e) => {
                    error!(remote = %self.policy.target, "Remote edit failed, using local backend: {e}");
                },
            }
        } else {
            debug!("Remote dispatch disabled");
        }

        let png_bytes = self.run_local(&request).await?;
        Ok(self.finish(png_bytes, BackendKind::Local, start))
    }

    fn finish(&self, png_bytes: Vec<u8>, backend: BackendKind, start: Instant) -> EditedImage {
        let elapsed = start.elapsed();
        Span::current().record("backend", backend.as_str());
        info!(
            backend = backend.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = png_bytes.len(),
            "Edit completed"
        );
        EditedImage {
            png_bytes,
            backend,
            elapsed,
        }
    }

    /// One bounded remote attempt
    ///
    /// The timeout covers resolving the remote function on first use, the
    /// wait for a pool slot and the call itself.
    async fn try_remote(&self, request: &EditRequest) -> Result<Vec<u8>> {
        let timeout = self.policy.remote_timeout();
        let cancel = CancellationToken::new();

        let png_bytes =
            match tokio::time::timeout(timeout, self.remote_attempt(request, cancel.clone())).await {
                Ok(result) => result?,
                Err(_) => {
                    cancel.cancel();
                    return Err(RemoteError::Timeout(timeout).into());
                },
            };

        if png_bytes.is_empty() {
            return Err(RemoteError::NoImage.into());
        }
        ImageCodec::probe(&png_bytes)
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;
        Ok(png_bytes)
    }

    async fn remote_attempt(
        &self,
        request: &EditRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>> {
        let backend = self.registry.remote(&self.policy).await?;
        let permit = Arc::clone(&self.remote_pool)
            .acquire_owned()
            .await
            .map_err(|_| RemoteError::PoolClosed)?;

        let request_id = request.id;
        let instruction = request.instruction.clone();
        let image = request.source_image.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = backend.edit(&instruction, &image);
            if cancel.is_cancelled() {
                let outcome = match &result {
                    Ok(bytes) => format!("{} bytes", bytes.len()),
                    Err(e) => e.to_string(),
                };
                warn!(%request_id, "Discarding late remote result ({outcome})");
            }
            result
        })
        .await
        .map_err(|e| {
            let remote = if e.is_panic() {
                RemoteError::Worker("remote call panicked".to_string())
            } else {
                RemoteError::Transport(format!("remote call aborted: {e}"))
            };
            ImageEditError::from(remote)
        })?
    }

    async fn run_local(&self, request: &EditRequest) -> Result<Vec<u8>> {
        let backend = self.registry.local().await?;
        let instruction = request.instruction.clone();
        let image = request.source_image.clone();

        let png_bytes = tokio::task::spawn_blocking(move || backend.edit(&instruction, &image))
            .await
            .map_err(|e| ImageEditError::internal(format!("local edit task failed: {e}")))??;

        if png_bytes.is_empty() {
            return Err(ImageEditError::edit("local backend returned an empty image"));
        }
        Ok(png_bytes)
    }
}
