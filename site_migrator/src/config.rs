//! Configuration handling for the migration runner

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file {}: {}", path, e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file {}: {}", path, e)))?;

    Ok(config)
}

/// Represents the complete runner configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub retry: RetryConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: Option<LoggingConfig>,
    pub security: SecurityConfig,
}

/// Where the connection string comes from and how the client is invoked
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Environment variable carrying the connection string
    pub url_env: String,
    pub default_port: u16,
    /// Database client binary
    pub client: String,
    /// Variable the client reads the password from
    pub password_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env: "SUPABASE_DB_URL".to_string(),
            default_port: 5432,
            client: "psql".to_string(),
            password_env: "PGPASSWORD".to_string(),
        }
    }
}

/// Migration settings configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dry_run: bool,
}

/// Retry loop configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

/// Pre-flight diagnostics configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub dns_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
}

impl DiagnosticsConfig {
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dns_timeout_seconds: 5,
            probe_timeout_seconds: 3,
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: String,
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: "text".to_string(),
            stdout: true,
        }
    }
}

/// Security configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    /// Mask credentials in captured client output before logging it
    pub mask_logs: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { mask_logs: true }
    }
}
