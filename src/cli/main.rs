//! Image edit service command line
//!
//! Every option can also be set through the environment variable named in
//! its help text.

use super::config::CliConfigBuilder;
use crate::{server, tracing_config::TracingFormat, worker};
use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, ArgAction, Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;

/// Image edit service with remote GPU dispatch and local fallback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "canvas-image-edit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log level name (DEBUG, INFO, WARNING, ERROR)
    #[arg(long, env = "LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = CliLogFormat::Console, global = true)]
    pub log_format: CliLogFormat,

    /// Address to bind
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    /// Port to bind
    #[arg(short, long, env = "API_PORT", default_value_t = 8000, global = true)]
    pub port: u16,

    /// Origins allowed to call the API from a browser ("*" mirrors any origin)
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_values = crate::config::DEFAULT_CORS_ORIGINS,
        global = true
    )]
    pub cors_origins: Vec<String>,

    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Gemini image model
    #[arg(long, env = "GEMINI_MODEL_ID", default_value = crate::config::DEFAULT_MODEL_ID, global = true)]
    pub model: String,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_API_BASE", default_value = crate::config::DEFAULT_API_BASE, global = true)]
    pub api_base: String,

    /// Timeout of one Gemini call in seconds
    #[arg(long, env = "GEMINI_TIMEOUT_SECS", default_value_t = 120, global = true)]
    pub edit_timeout: u64,

    /// Segmentation model repository used for background removal
    #[arg(long, env = "BACKGROUND_MODEL_URL", default_value = crate::config::DEFAULT_SEGMENTATION_MODEL_URL, global = true)]
    pub background_model_url: String,

    /// Segmentation model precision variant (fp32, fp16)
    #[arg(long, env = "BACKGROUND_MODEL_VARIANT", default_value = crate::config::DEFAULT_SEGMENTATION_VARIANT, global = true)]
    pub background_model_variant: String,

    /// Root directory for downloaded models (platform cache dir when unset)
    #[arg(long, env = "MODEL_CACHE_DIR", global = true)]
    pub model_cache_dir: Option<PathBuf>,

    /// Maximum upload size in megabytes
    #[arg(long, env = "MAX_IMAGE_SIZE_MB", default_value_t = 10, global = true)]
    pub max_image_mb: usize,

    /// Accepted image types (comma separated extensions)
    #[arg(
        long,
        env = "ALLOWED_IMAGE_TYPES",
        value_delimiter = ',',
        default_values = ["jpeg", "jpg", "png", "webp"],
        global = true
    )]
    pub allowed_types: Vec<String>,

    /// Try the remote GPU worker before the local backend
    #[arg(
        long,
        env = "USE_REMOTE_GPU",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set,
        default_value = "false",
        global = true
    )]
    pub use_remote_gpu: bool,

    /// Base URL of the remote worker platform
    #[arg(long, env = "REMOTE_ENDPOINT", global = true)]
    pub remote_endpoint: Option<String>,

    /// Remote application name
    #[arg(long, env = "REMOTE_APP_NAME", default_value = crate::config::DEFAULT_REMOTE_APP, global = true)]
    pub remote_app: String,

    /// Remote function name
    #[arg(long, env = "REMOTE_FUNCTION_NAME", default_value = crate::config::DEFAULT_REMOTE_FUNCTION, global = true)]
    pub remote_function: String,

    /// Bound of one remote attempt in seconds, pool wait included
    #[arg(long, env = "REMOTE_CALL_TIMEOUT", default_value_t = 120, global = true)]
    pub remote_timeout: u64,

    /// Remote calls allowed in flight at once
    #[arg(long, env = "REMOTE_MAX_IN_FLIGHT", default_value_t = 4, global = true)]
    pub remote_max_in_flight: usize,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the image edit HTTP API (default)
    Serve,
    /// Serve the remote function contract on a GPU host
    Worker,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    let command = cli.command.unwrap_or(Command::Serve);
    info!("Starting {} {:?}", env!("CARGO_PKG_NAME"), command);

    match command {
        Command::Serve => server::serve(config)
            .await
            .context("Image edit service failed"),
        Command::Worker => worker::serve(config)
            .await
            .context("Remote worker failed"),
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    use crate::tracing_config::TracingConfig;

    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into())
        .with_instance_id(uuid::Uuid::new_v4().to_string());
    if let Some(level) = &cli.log_level {
        config = config.with_log_level(level.clone());
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(filter);
    }

    config
        .init()
        .context("Failed to initialize tracing subscriber")
}
