//! Request handling: dispatch, encode, and map every outcome to an envelope

use crate::{
    codec::ImageCodec,
    dispatcher::BackendDispatcher,
    error::ErrorKind,
    types::{BackendKind, EditRequest, EditResponse},
};
use log::{error, info, warn};
use std::sync::Arc;

pub const SUCCESS_MESSAGE: &str = "Image edit completed";
pub const UNHANDLED_MESSAGE: &str = "Server error: the request could not be completed";

/// Envelope plus the classification the transport maps to a status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// `None` on success
    pub kind: Option<ErrorKind>,
    /// Backend that produced the image, on success
    pub backend: Option<BackendKind>,
    pub response: EditResponse,
}

impl HandlerOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind.is_none()
    }
}

/// Turns `(instruction, image)` into an [`EditResponse`]
///
/// Never fails: every error, panics included, becomes `success = false`.
#[derive(Clone)]
pub struct RequestHandler {
    dispatcher: Arc<BackendDispatcher>,
}

impl RequestHandler {
    #[must_use]
    pub fn new(dispatcher: Arc<BackendDispatcher>) -> Self {
        Self { dispatcher }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<BackendDispatcher> {
        &self.dispatcher
    }

    pub async fn handle(&self, instruction: String, image: Vec<u8>) -> HandlerOutcome {
        let request = EditRequest::new(instruction, image);
        let request_id = request.id;
        info!(
            "Edit request {request_id} received ({} bytes)",
            request.source_image.len()
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let joined = tokio::spawn(async move { dispatcher.dispatch(request).await }).await;

        match joined {
            Ok(Ok(edited)) => HandlerOutcome {
                kind: None,
                backend: Some(edited.backend),
                response: EditResponse::success(
                    SUCCESS_MESSAGE,
                    ImageCodec::encode(&edited.png_bytes),
                ),
            },
            Ok(Err(e)) => {
                let kind = match e.kind() {
                    // Remote errors never leave the dispatcher
                    ErrorKind::Remote => ErrorKind::Unhandled,
                    other => other,
                };
                let message = match kind {
                    ErrorKind::Unhandled => {
                        error!("Edit request {request_id} failed unexpectedly: {e}");
                        UNHANDLED_MESSAGE.to_string()
                    },
                    _ => {
                        warn!("Edit request {request_id} failed ({kind}): {e}");
                        e.to_string()
                    },
                };
                HandlerOutcome {
                    kind: Some(kind),
                    backend: None,
                    response: EditResponse::failure(message),
                }
            },
            Err(join_error) => {
                error!("Edit request {request_id} aborted: {join_error}");
                HandlerOutcome {
                    kind: Some(ErrorKind::Unhandled),
                    backend: None,
                    response: EditResponse::failure(UNHANDLED_MESSAGE),
                }
            },
        }
    }
}
