//! Structured logging for Momentwall services.
//!
//! `RUST_LOG` takes precedence over the configured level. JSON lines are the
//! production format; the console format is for local runs.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{fmt as layer_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Unknown log format '{0}' (expected json or console)")]
    UnknownFormat(String),

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Console,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "pretty" | "text" => Ok(LogFormat::Console),
            _ => Err(LoggingError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::Console => "console",
        })
    }
}

/// What to install for one service process
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub service: String,
    pub level: String,
    pub format: LogFormat,
}

impl LogSettings {
    pub fn new(service: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            level: level.into(),
            format: LogFormat::default(),
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// The filter in effect, given the value of `RUST_LOG` if any
    pub fn filter(&self, rust_log: Option<&str>) -> Result<EnvFilter, LoggingError> {
        let directive = rust_log
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.level.as_str());
        EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
            directive: directive.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber; fails rather than panics if one exists
pub fn try_init(settings: &LogSettings) -> Result<(), LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = settings.filter(rust_log.as_deref())?;

    let installed = match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                layer_fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Console => tracing_subscriber::registry()
            .with(filter)
            .with(layer_fmt::layer().with_target(true))
            .try_init(),
    };
    installed.map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::info!(
        service = %settings.service,
        format = %settings.format,
        level = %settings.level,
        "Logging initialized"
    );
    Ok(())
}

/// Route logs through the test harness's captured output. Safe to call from every test.
pub fn init_for_tests(level: &str) {
    let filter = LogSettings::new("test", level)
        .filter(None)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
