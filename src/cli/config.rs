//! Configuration conversion for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::ServiceConfig;
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments into a validated `ServiceConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServiceConfig> {
        ServiceConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .cors_origins(cli.cors_origins.iter())
            .api_key(cli.api_key.clone())
            .model_id(cli.model.clone())
            .api_base(cli.api_base.clone())
            .edit_timeout(Duration::from_secs(cli.edit_timeout))
            .segmentation_model_url(cli.background_model_url.clone())
            .segmentation_variant(cli.background_model_variant.clone())
            .model_cache_dir(cli.model_cache_dir.clone())
            .max_image_mb(cli.max_image_mb)
            .allowed_types(cli.allowed_types.iter().map(|t| t.trim().to_string()))
            .remote_enabled(cli.use_remote_gpu)
            .remote_endpoint(cli.remote_endpoint.clone())
            .remote_app(cli.remote_app.clone())
            .remote_function(cli.remote_function.clone())
            .remote_timeout(Duration::from_secs(cli.remote_timeout))
            .max_in_flight(cli.remote_max_in_flight)
            .build()
            .context("Failed to build service configuration")
    }
}
