//! Logging utilities for the migration runner
//!
//! This module provides logging setup and configuration.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Parse a configured level name, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the event filter: `RUST_LOG` sets the baseline and the configured
/// level applies to this crate.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let level = parse_level(&config.level);
    let directive: Directive = format!("site_migrator={}", level)
        .parse()
        .map_err(|e| Error::LoggingError(format!("invalid log directive: {}", e)))?;

    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(directive))
}

/// Initialize logging based on configuration. Without a `[logging]` section
/// events go to stdout as text at INFO.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<()> {
    let default_config = LoggingConfig::default();
    let config = config.unwrap_or(&default_config);
    let env_filter = build_filter(config)?;
    let json = config.format.eq_ignore_ascii_case("json");

    if let Some(file_path) = &config.file {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::LoggingError(format!("Failed to create log directory: {}", e))
            })?;
        }
        let file = File::create(file_path)
            .map_err(|e| Error::LoggingError(format!("Failed to create log file: {}", e)))?;
        let file = Mutex::new(file);

        if json {
            let subscriber = fmt::Subscriber::builder()
                .json()
                .with_env_filter(env_filter)
                .with_writer(file)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::LoggingError(e.to_string()))?;
        } else {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(file)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::LoggingError(e.to_string()))?;
        }
    } else if config.stdout {
        if json {
            let subscriber = fmt::Subscriber::builder()
                .json()
                .with_env_filter(env_filter)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::LoggingError(e.to_string()))?;
        } else {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::LoggingError(e.to_string()))?;
        }
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| Error::LoggingError(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_build_filter_accepts_every_level() {
        for level in ["trace", "debug", "info", "warn", "error", "bogus"] {
            let config = LoggingConfig {
                level: level.to_string(),
                ..LoggingConfig::default()
            };
            assert!(build_filter(&config).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_unwritable_log_file_is_a_configuration_failure() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let file = blocker.path().join("logs").join("migrate.log");
        let config = LoggingConfig {
            file: Some(file.to_string_lossy().into_owned()),
            ..LoggingConfig::default()
        };

        let err = init_logging(Some(&config)).unwrap_err();

        assert!(matches!(err, Error::LoggingError(_)), "{err:?}");
        assert_eq!(err.exit_code(), 2);
    }
}
