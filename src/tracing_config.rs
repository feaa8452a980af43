//! Tracing configuration for the service binary
//!
//! The library only emits `log` records and `tracing` events; the binary
//! installs the subscriber through [`TracingConfig::init`]. `log` records are
//! bridged into the subscriber by `tracing-subscriber`'s log compatibility.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default)
    Console,
    /// Compact console output without colors, for containers and CI
    Compact,
    /// JSON structured logging for log shippers
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity from repeated `-v` flags
    pub verbosity: u8,
    /// Level name from `LOG_LEVEL` (python style names accepted)
    pub log_level: Option<String>,
    /// Output format
    pub format: TracingFormat,
    /// Explicit filter directives (overrides everything else)
    pub env_filter: Option<String>,
    /// Instance id logged once at startup for correlation
    pub instance_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            log_level: None,
            format: TracingFormat::Console,
            env_filter: None,
            instance_id: None,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom filter directives
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn with_instance_id<S: Into<String>>(mut self, instance_id: S) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Level requested through `LOG_LEVEL`, if recognised
    pub fn log_level_filter(&self) -> Option<&'static str> {
        let level = self.log_level.as_deref()?.trim().to_ascii_lowercase();
        match level.as_str() {
            "critical" | "fatal" | "error" => Some("error"),
            "warning" | "warn" => Some("warn"),
            "info" => Some("info"),
            "debug" => Some("debug"),
            "trace" => Some("trace"),
            _ => None,
        }
    }

    /// Level for this crate: `-v` flags win over `LOG_LEVEL`
    pub fn crate_level(&self) -> &'static str {
        match self.verbosity {
            0 => self.log_level_filter().unwrap_or("info"),
            1 => "debug",
            _ => "trace",
        }
    }

    /// Filter directives: this crate at the chosen level, HTTP internals quieter
    pub fn filter_directives(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }
        let level = self.crate_level();
        let dependencies = if self.verbosity >= 2 { "debug" } else { "warn" };
        format!(
            "{level},canvas_image_edit={level},hyper={dependencies},reqwest={dependencies},h2={dependencies}"
        )
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directives())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(instance_id) = &self.instance_id {
            tracing::info!(instance_id = %instance_id, "Instance started");
        }

        Ok(())
    }
}
