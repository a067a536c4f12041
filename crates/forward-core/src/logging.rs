//! Logging setup for processes embedding the forwarding core.
//!
//! The library itself only emits `tracing` events under the
//! `rvoip_forward_core` target. Binaries and test harnesses that want them
//! printed install a `tracing-subscriber` formatter here, optionally driven by
//! a `[logging]` table next to `[forward]`:
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//! file-info = true
//! ```

use std::str::FromStr;

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::filter::Directive;

use crate::common::errors::ConfigError;

const CRATE_TARGET: &str = "rvoip_forward_core";

/// Output format of forwarded-request logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    /// Level for the forwarding core's own events
    pub level: String,
    pub format: LogFormat,
    /// Include source file and line in each event
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file_info: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    logging: LoggingConfig,
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level: level.to_string().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Read the `[logging]` table of a TOML document; a missing table gives
    /// the defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        parse_log_level(&file.logging.level)?;
        Ok(file.logging)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// The directive scoping the configured level to this crate
    pub fn directive(&self) -> Result<Directive, ConfigError> {
        let level = parse_log_level(&self.level)?;
        format!("{}={}", CRATE_TARGET, level.as_str().to_ascii_lowercase())
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives apply to every other target. Fails with
/// [`ConfigError::Logging`] once a global subscriber is installed.
pub fn setup_logging(config: LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::from_default_env().add_directive(config.directive()?);
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Parse a log level, case-insensitively
pub fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    Level::from_str(level).map_err(|_| ConfigError::InvalidLogLevel(level.to_string()))
}
