//! Tracing subscriber setup with format selection.
//!
//! Logging format is controlled via `SHMHEAP_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable multi-line output (default for TTY)
//! - `compact` - Compact single-line format (default for non-TTY)
//!
//! Logs go to stderr so command output on stdout stays scriptable.

use anyhow::{Context, Result};
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for structured logging.
    Json,
    /// Human-readable pretty format.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::default(),
        })
    }
}

/// Configuration for the CLI subscriber.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    log_format: LogFormat,
    log_filter: String,
    include_location: bool,
    include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "warn".to_string(),
            include_location: false,
            include_target: true,
        }
    }
}

impl TracingConfig {
    /// Configuration for a `-v` count, honouring `SHMHEAP_LOG_FORMAT`,
    /// `RUST_LOG` and `SHMHEAP_LOG_LOCATION`.
    pub fn from_env(verbosity: u8) -> Self {
        let filter = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        let log_format = std::env::var("SHMHEAP_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse::<LogFormat>().ok())
            .unwrap_or_else(|| {
                if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
                    LogFormat::Pretty
                } else {
                    LogFormat::Compact
                }
            });

        Self {
            log_format,
            log_filter: std::env::var("RUST_LOG").unwrap_or_else(|_| filter.to_string()),
            include_location: std::env::var("SHMHEAP_LOG_LOCATION")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            ..Self::default()
        }
    }

    /// Get the log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Get the log filter.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }
}

/// Install the global subscriber.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.log_format() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_target(config.include_target)
                        .flatten_event(true),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_target(config.include_target),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_target(config.include_target),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("other".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    }

    #[test]
    fn default_filter_is_warn() {
        assert_eq!(TracingConfig::default().log_filter(), "warn");
    }
}
