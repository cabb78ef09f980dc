//! Logging setup for the qcast binaries
//!
//! All log output goes to stderr; stdout is reserved for the CLIs'
//! machine-readable JSON reports. Format and level come from the
//! `QCAST_LOG_FORMAT` and `QCAST_LOG_LEVEL` environment variables, with
//! `--verbose` forcing debug.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

const FORMAT_VAR: &str = "QCAST_LOG_FORMAT";
const LEVEL_VAR: &str = "QCAST_LOG_LEVEL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, cron-friendly)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

fn resolve_format() -> LogFormat {
    std::env::var(FORMAT_VAR)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn resolve_level(verbose: bool) -> String {
    if verbose {
        return "debug".to_string();
    }
    std::env::var(LEVEL_VAR).unwrap_or_else(|_| "info".to_string())
}

/// Initialize logging for one CLI invocation.
///
/// # Panics
///
/// Panics if the logging subscriber has already been initialized.
pub fn init_cli(verbose: bool) {
    init_with(resolve_format(), &resolve_level(verbose));
}

pub fn init_with(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);

        // Case insensitive
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_log_format_from_str_invalid() {
        let result = "pretty".parse::<LogFormat>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid log format"));
    }

    #[test]
    fn test_log_format_display() {
        assert_eq!(LogFormat::Text.to_string(), "text");
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    #[serial]
    fn test_resolve_format_from_env() {
        std::env::set_var(FORMAT_VAR, "json");
        assert_eq!(resolve_format(), LogFormat::Json);

        std::env::set_var(FORMAT_VAR, "nonsense");
        assert_eq!(resolve_format(), LogFormat::Text);

        std::env::remove_var(FORMAT_VAR);
        assert_eq!(resolve_format(), LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_resolve_level_verbose_overrides_env() {
        std::env::set_var(LEVEL_VAR, "warn");
        assert_eq!(resolve_level(false), "warn");
        assert_eq!(resolve_level(true), "debug");

        std::env::remove_var(LEVEL_VAR);
        assert_eq!(resolve_level(false), "info");
    }
}
