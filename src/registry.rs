//! Lazy, process-lifetime backend handles
//!
//! The registry is built once at startup and shared by every request. Each
//! backend is constructed on first use through a [`BackendFactory`]; concurrent
//! first callers wait for the single in-flight construction. A failed
//! construction leaves the cell empty so the next request tries again.

use crate::{
    background::SegmentationRemover,
    backends::{EditBackend, FunctionResolver, HttpFunctionResolver, LocalEditBackend, RemoteEditBackend},
    cache::ModelCache,
    config::{LocalEditConfig, RoutingPolicy},
    download::ModelDownloader,
    error::{ImageEditError, RemoteError, Result},
};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Constructs edit backends
///
/// Injected into the registry so tests can substitute counting stubs.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Create the local backend
    ///
    /// # Errors
    /// - `Configuration` when credentials are missing
    async fn create_local(&self) -> Result<Arc<dyn EditBackend>>;

    /// Resolve and create the remote backend for `policy`
    ///
    /// # Errors
    /// - `Remote` for a missing endpoint, a failed lookup or a transport fault
    async fn create_remote(&self, policy: &RoutingPolicy) -> Result<Arc<dyn EditBackend>>;
}

/// Factory building the Gemini local backend and the HTTP remote backend
///
/// The local backend needs the segmentation model: it is fetched into the
/// model cache on first use, then loaded with Tract. Model loading and both
/// blocking HTTP clients are created on the blocking pool.
pub struct DefaultBackendFactory {
    local: LocalEditConfig,
    resolver: Arc<dyn FunctionResolver>,
}

impl DefaultBackendFactory {
    #[must_use]
    pub fn new(local: LocalEditConfig) -> Self {
        Self::with_resolver(local, Arc::new(HttpFunctionResolver))
    }

    #[must_use]
    pub fn with_resolver(local: LocalEditConfig, resolver: Arc<dyn FunctionResolver>) -> Self {
        Self { local, resolver }
    }
}

fn join_error(e: tokio::task::JoinError) -> ImageEditError {
    ImageEditError::internal(format!("backend construction task failed: {e}"))
}

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn create_local(&self) -> Result<Arc<dyn EditBackend>> {
        LocalEditBackend::ensure_configured(&self.local)?;

        let segmentation = &self.local.segmentation;
        let cache = ModelCache::new(segmentation.cache_dir.as_deref())?;
        let model_dir = ModelDownloader::new(cache)?
            .ensure_model(&segmentation.model_url, &segmentation.variant)
            .await?;

        let config = self.local.clone();
        let backend = tokio::task::spawn_blocking(move || {
            let remover = SegmentationRemover::load(&model_dir, &config.segmentation.variant)?;
            LocalEditBackend::from_config(&config, Arc::new(remover))
        })
        .await
        .map_err(join_error)??;
        Ok(Arc::new(backend))
    }

    async fn create_remote(&self, policy: &RoutingPolicy) -> Result<Arc<dyn EditBackend>> {
        if policy.target.endpoint.is_none() {
            return Err(RemoteError::NotConfigured(format!(
                "REMOTE_ENDPOINT is not set for {}",
                policy.target
            ))
            .into());
        }

        let resolver = Arc::clone(&self.resolver);
        let target = policy.target.clone();
        let timeout = policy.remote_timeout();
        let backend = tokio::task::spawn_blocking(move || {
            RemoteEditBackend::connect(resolver.as_ref(), &target, timeout)
        })
        .await
        .map_err(join_error)??;
        Ok(Arc::new(backend))
    }
}

/// Initialize-once holder of both backend handles
pub struct BackendRegistry {
    factory: Arc<dyn BackendFactory>,
    local: OnceCell<Arc<dyn EditBackend>>,
    remote: OnceCell<Arc<dyn EditBackend>>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            local: OnceCell::new(),
            remote: OnceCell::new(),
        }
    }

    /// Local handle, constructing it on first use
    ///
    /// # Errors
    /// Construction errors from the factory; they are not cached.
    pub async fn local(&self) -> Result<Arc<dyn EditBackend>> {
        let backend = self
            .local
            .get_or_try_init(|| async {
                info!("Initializing local edit backend");
                self.factory.create_local().await
            })
            .await?;
        Ok(Arc::clone(backend))
    }

    /// Remote handle, constructing it on first use
    ///
    /// # Errors
    /// Construction errors from the factory; they are not cached.
    pub async fn remote(&self, policy: &RoutingPolicy) -> Result<Arc<dyn EditBackend>> {
        let backend = self
            .remote
            .get_or_try_init(|| async {
                info!("Initializing remote edit backend for {}", policy.target);
                self.factory.create_remote(policy).await
            })
            .await?;
        Ok(Arc::clone(backend))
    }

    #[must_use]
    pub fn is_local_initialized(&self) -> bool {
        self.local.initialized()
    }

    #[must_use]
    pub fn is_remote_initialized(&self) -> bool {
        self.remote.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{StubBackend, StubFactory};
    use crate::config::RemoteTarget;
    use crate::error::ErrorKind;
    use crate::types::BackendKind;
    use std::time::Duration;

    fn registry(factory: &StubFactory) -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::new(Arc::new(factory.clone())))
    }

    #[tokio::test]
    async fn test_concurrent_first_use_constructs_once() {
        let factory = StubFactory::new(Some(StubBackend::succeeding(BackendKind::Local)), None)
            .with_creation_delay(Duration::from_millis(50));
        let registry = registry(&factory);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.local().await })
            })
            .collect();
        let backends: Vec<Arc<dyn EditBackend>> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(factory.local_creations(), 1);
        assert!(backends.iter().all(|b| Arc::ptr_eq(b, &backends[0])));
        assert!(registry.is_local_initialized());
        assert!(!registry.is_remote_initialized());
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let factory = StubFactory::new(Some(StubBackend::succeeding(BackendKind::Local)), None)
            .failing_local_creations(1);
        let registry = registry(&factory);

        let err = registry.local().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!registry.is_local_initialized());

        assert!(registry.local().await.is_ok());
        assert_eq!(factory.local_creations(), 2);

        assert!(registry.local().await.is_ok());
        assert_eq!(factory.local_creations(), 2);
    }

    #[tokio::test]
    async fn test_remote_lookup_failure_surfaces_as_remote_error() {
        let factory = StubFactory::new(None, None);
        let registry = registry(&factory);

        let err = registry.remote(&RoutingPolicy::default()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(factory.remote_creations(), 1);
        assert!(!registry.is_remote_initialized());
    }

    #[tokio::test]
    async fn test_default_factory_without_endpoint_is_not_configured() {
        let factory = DefaultBackendFactory::new(LocalEditConfig::default());
        let policy = RoutingPolicy {
            remote_enabled: true,
            target: RemoteTarget::default(),
            ..RoutingPolicy::default()
        };

        let err = factory.create_remote(&policy).await.err().unwrap();
        assert!(matches!(
            err,
            ImageEditError::Remote(RemoteError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_default_factory_without_api_key_is_configuration_error() {
        let factory = DefaultBackendFactory::new(LocalEditConfig::default());
        let err = factory.create_local().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    fn keyed_config(cache_root: &std::path::Path, model_url: &str) -> LocalEditConfig {
        let mut config = LocalEditConfig {
            api_key: Some("test-key".to_string()),
            ..LocalEditConfig::default()
        };
        config.segmentation.model_url = model_url.to_string();
        config.segmentation.cache_dir = Some(cache_root.to_path_buf());
        config
    }

    #[tokio::test]
    async fn test_default_factory_reports_unreachable_model_repository() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let factory = DefaultBackendFactory::new(keyed_config(
            temp_dir.path(),
            "http://127.0.0.1:1/org/model",
        ));

        let err = factory.create_local().await.err().unwrap();
        assert!(matches!(err, ImageEditError::Model(_)));
        assert_eq!(err.kind(), ErrorKind::Unhandled);
    }

    #[tokio::test]
    async fn test_default_factory_loads_cached_model_without_download() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let url = "http://127.0.0.1:1/org/model";
        let model_dir = ModelCache::new(Some(temp_dir.path()))
            .unwrap()
            .model_path(&ModelCache::url_to_model_id(url));
        std::fs::create_dir_all(model_dir.join("onnx")).unwrap();
        std::fs::write(model_dir.join("config.json"), r#"{"model_type": "isnet"}"#).unwrap();
        std::fs::write(
            model_dir.join("preprocessor_config.json"),
            r#"{"size": {"height": 32, "width": 32}, "image_mean": [128, 128, 128], "image_std": [256, 256, 256]}"#,
        )
        .unwrap();
        std::fs::write(model_dir.join("onnx").join("model.onnx"), b"not an onnx graph").unwrap();

        let factory = DefaultBackendFactory::new(keyed_config(temp_dir.path(), url));
        let err = factory.create_local().await.err().unwrap();

        // The cached copy is used, so the failure comes from loading, not downloading
        assert!(err.to_string().contains("ONNX"));
        assert!(matches!(err, ImageEditError::Model(_)));
    }
}
