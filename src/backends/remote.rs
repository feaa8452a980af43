//! Remote edit backend
//!
//! The accelerator worker platform is addressed by `(app, function)`. A
//! [`FunctionResolver`] turns that identity into a callable [`RemoteFunction`]
//! once; every later edit goes straight to the resolved function.
//!
//! The HTTP implementations use the blocking `reqwest` client and must run on
//! a blocking thread, never directly on the async scheduler.

use crate::{
    backends::EditBackend,
    codec::ImageCodec,
    config::RemoteTarget,
    error::{RemoteError, Result},
    types::BackendKind,
};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Answer of a function lookup on the worker platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub app: String,
    pub function: String,
    /// Path of the invoke route, relative to the platform endpoint
    pub invoke_path: String,
}

impl FunctionDescriptor {
    #[must_use]
    pub fn for_target(app: &str, function: &str) -> Self {
        Self {
            app: app.to_string(),
            function: function.to_string(),
            invoke_path: format!("/apps/{app}/functions/{function}/invoke"),
        }
    }
}

/// Arguments of one remote edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInvocation {
    pub instruction: String,
    /// Source image, standard base64
    pub image_b64: String,
}

/// Result of one remote edit: image data or the worker's own error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInvocationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteInvocationResult {
    #[must_use]
    pub fn image(bytes: &[u8]) -> Self {
        Self {
            image_b64: Some(ImageCodec::encode(bytes)),
            error: None,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            image_b64: None,
            error: Some(message.into()),
        }
    }

    /// Interpret the worker answer
    ///
    /// # Errors
    /// - `Worker` when the worker reported an error
    /// - `NoImage` when no image data is present
    /// - `MalformedResponse` when the image data is not base64
    pub fn into_image(self) -> std::result::Result<Vec<u8>, RemoteError> {
        if let Some(error) = self.error {
            return Err(RemoteError::Worker(error));
        }
        let data = self
            .image_b64
            .filter(|data| !data.trim().is_empty())
            .ok_or(RemoteError::NoImage)?;
        ImageCodec::decode(&data).map_err(|e| RemoteError::MalformedResponse(e.to_string()))
    }
}

/// Callable handle to a deployed remote function
pub trait RemoteFunction: Send + Sync {
    /// Run one edit, bounded by `timeout`
    ///
    /// # Errors
    /// Every failure is a [`RemoteError`].
    fn call(
        &self,
        instruction: &str,
        image: &[u8],
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, RemoteError>;
}

/// Resolves a remote function by application and function name
pub trait FunctionResolver: Send + Sync {
    /// Look up the target and return a callable handle, bounded by `timeout`
    ///
    /// # Errors
    /// - `NotConfigured` when the target has no endpoint
    /// - `Lookup` when the platform does not know the function
    /// - `Timeout` when the platform does not answer within `timeout`
    /// - `Transport` on other network faults
    fn lookup(
        &self,
        target: &RemoteTarget,
        timeout: Duration,
    ) -> std::result::Result<Arc<dyn RemoteFunction>, RemoteError>;
}

/// Resolver speaking the worker platform's HTTP contract
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFunctionResolver;

fn transport(e: &reqwest::Error, timeout: Duration) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout(timeout)
    } else {
        RemoteError::Transport(e.to_string())
    }
}

impl FunctionResolver for HttpFunctionResolver {
    fn lookup(
        &self,
        target: &RemoteTarget,
        timeout: Duration,
    ) -> std::result::Result<Arc<dyn RemoteFunction>, RemoteError> {
        let endpoint = target
            .endpoint
            .as_deref()
            .ok_or_else(|| RemoteError::NotConfigured(format!("no endpoint for {target}")))?;
        let lookup_failed = |reason: String| RemoteError::Lookup {
            app: target.app_name.clone(),
            function: target.function_name.clone(),
            reason,
        };

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| transport(&e, timeout))?;

        let url = format!(
            "{endpoint}/apps/{}/functions/{}",
            target.app_name, target.function_name
        );
        debug!("Looking up remote function at {url}");

        let response = client.get(&url).send().map_err(|e| transport(&e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(lookup_failed(format!("platform answered HTTP {status}")));
        }

        let descriptor: FunctionDescriptor = response
            .json()
            .map_err(|e| lookup_failed(format!("unreadable descriptor: {e}")))?;
        if descriptor.app != target.app_name || descriptor.function != target.function_name {
            return Err(lookup_failed(format!(
                "platform resolved {}/{} instead",
                descriptor.app, descriptor.function
            )));
        }

        info!("Resolved remote function {target}");
        Ok(Arc::new(HttpRemoteFunction {
            client,
            invoke_url: format!("{endpoint}{}", descriptor.invoke_path),
        }))
    }
}

/// Remote function invoked with a JSON POST
pub struct HttpRemoteFunction {
    client: Client,
    invoke_url: String,
}

impl RemoteFunction for HttpRemoteFunction {
    fn call(
        &self,
        instruction: &str,
        image: &[u8],
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, RemoteError> {
        let invocation = RemoteInvocation {
            instruction: instruction.to_string(),
            image_b64: ImageCodec::encode(image),
        };

        let response = self
            .client
            .post(&self.invoke_url)
            .timeout(timeout)
            .json(&invocation)
            .send()
            .map_err(|e| transport(&e, timeout))?;

        let status = response.status();
        let result: RemoteInvocationResult = response
            .json()
            .map_err(|e| RemoteError::MalformedResponse(format!("HTTP {status}: {e}")))?;
        if !status.is_success() && result.error.is_none() {
            return Err(RemoteError::Worker(format!("worker answered HTTP {status}")));
        }
        result.into_image()
    }
}

/// Edit backend delegating to a resolved remote function
pub struct RemoteEditBackend {
    function: Arc<dyn RemoteFunction>,
    timeout: Duration,
}

impl RemoteEditBackend {
    #[must_use]
    pub fn new(function: Arc<dyn RemoteFunction>, timeout: Duration) -> Self {
        Self { function, timeout }
    }

    /// Resolve `target` through `resolver` and wrap the result
    ///
    /// `timeout` bounds the lookup as well as every later call.
    ///
    /// # Errors
    /// See [`FunctionResolver::lookup`].
    pub fn connect(
        resolver: &dyn FunctionResolver,
        target: &RemoteTarget,
        timeout: Duration,
    ) -> std::result::Result<Self, RemoteError> {
        let function = resolver.lookup(target, timeout)?;
        Ok(Self::new(function, timeout))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl EditBackend for RemoteEditBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn edit(&self, instruction: &str, image: &[u8]) -> Result<Vec<u8>> {
        let bytes = self.function.call(instruction, image, self.timeout)?;
        if bytes.is_empty() {
            return Err(RemoteError::NoImage.into());
        }
        Ok(bytes)
    }
}
