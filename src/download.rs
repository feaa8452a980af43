//! Segmentation model download
//!
//! Files are fetched from `{model_url}/resolve/main/{file}` into a scratch
//! directory inside the cache and moved into place only once every file has
//! arrived, so an interrupted download never leaves a half-valid model.

use crate::cache::ModelCache;
use crate::error::{ImageEditError, Result};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Configuration files every model needs next to its ONNX file
const REQUIRED_FILES: &[&str] = &["config.json", "preprocessor_config.json"];

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetches models into a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader with the default 5 minute per-file timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        Self::with_timeout(cache, DOWNLOAD_TIMEOUT)
    }

    /// Create a downloader with an explicit per-file timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_timeout(cache: ModelCache, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageEditError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Make sure `variant` of the model at `url` is cached, downloading if needed
    ///
    /// Returns the model directory.
    ///
    /// # Errors
    /// - URL is not http(s)
    /// - Network errors or non-success HTTP status for any file
    /// - File system errors while writing or installing the files
    pub async fn ensure_model(&self, url: &str, variant: &str) -> Result<PathBuf> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ImageEditError::configuration(format!(
                "Unsupported model URL: {url}. Expected an http(s) repository URL."
            )));
        }

        let model_id = ModelCache::url_to_model_id(url);
        let final_dir = self.cache.model_path(&model_id);
        if self.cache.is_model_cached(&model_id, variant) {
            log::debug!("Segmentation model already cached: {model_id} ({variant})");
            return Ok(final_dir);
        }

        log::info!("Downloading segmentation model {url} ({variant})");
        let files = Self::files_for(variant);
        let temp_dir = self.create_temp_download_dir(&model_id)?;

        let downloaded = self.download_files(url, &temp_dir, &files).await;
        let installed = match downloaded {
            Ok(()) => Self::install(&temp_dir, &final_dir, &files),
            Err(e) => Err(e),
        };

        if temp_dir.exists() {
            if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                log::warn!("Failed to cleanup temp directory: {cleanup_err}");
            }
        }

        installed?;
        log::info!("Segmentation model cached at {}", final_dir.display());
        Ok(final_dir)
    }

    fn files_for(variant: &str) -> Vec<String> {
        let mut files: Vec<String> = REQUIRED_FILES.iter().map(|f| (*f).to_string()).collect();
        files.push(format!("onnx/{}", ModelCache::variant_file_name(variant)));
        files
    }

    fn create_temp_download_dir(&self, model_id: &str) -> Result<PathBuf> {
        let temp_dir = self
            .cache
            .cache_dir()
            .join(format!(".download-{model_id}-{}", std::process::id()));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                ImageEditError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| ImageEditError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    async fn download_files(&self, base_url: &str, download_dir: &Path, files: &[String]) -> Result<()> {
        let raw_base = format!("{}/resolve/main/", base_url.trim_end_matches('/'));
        for file_name in files {
            self.download_file(&format!("{raw_base}{file_name}"), &download_dir.join(file_name))
                .await?;
        }
        Ok(())
    }

    /// Move downloaded files into the model directory, one rename per file
    fn install(temp_dir: &Path, final_dir: &Path, files: &[String]) -> Result<()> {
        for file_name in files {
            let source = temp_dir.join(file_name);
            let target = final_dir.join(file_name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| ImageEditError::file_io_error("create directory", parent, &e))?;
            }
            fs::rename(&source, &target).map_err(|e| {
                ImageEditError::file_io_error("move downloaded file to cache", &target, &e)
            })?;
        }
        Ok(())
    }

    async fn download_file(&self, url: &str, local_path: &Path) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ImageEditError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageEditError::model(format!("Failed to download {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ImageEditError::model(format!(
                "HTTP error {} for {url}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| ImageEditError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let downloaded = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| ImageEditError::model(format!("Failed to read download stream for {url}: {e}")))?;

        file.flush()
            .await
            .map_err(|e| ImageEditError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {downloaded} bytes to {}", local_path.display());
        Ok(())
    }
}
