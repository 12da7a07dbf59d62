//! Error types for the migration runner

use thiserror::Error;

use crate::db::migrations::ExhaustionSummary;

/// Result type for migration runner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit code for configuration failures (nothing was attempted)
pub const EXIT_CONFIG: u8 = 2;

/// Process exit code when every connection attempt failed
pub const EXIT_EXHAUSTED: u8 = 3;

/// Error types for the migration runner
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The connection string parsed, but a required field is empty.
    /// Only non-secret fields are carried so the error can be printed as-is.
    #[error(
        "Failed to parse host/user/db from connection string (host={} user={} db={})",
        show(.host), show(.user), show(.database)
    )]
    ConnectionString {
        host: Option<String>,
        user: Option<String>,
        database: Option<String>,
    },

    #[error("Invalid port in connection string: {0:?}")]
    InvalidPort(String),

    #[error("{0}")]
    AttemptsExhausted(Box<ExhaustionSummary>),

    #[error("Logging setup error: {0}")]
    LoggingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Exit code the binary reports for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ConfigError(_)
            | Error::ConnectionString { .. }
            | Error::InvalidPort(_)
            | Error::LoggingError(_) => EXIT_CONFIG,
            Error::AttemptsExhausted(_) => EXIT_EXHAUSTED,
            Error::IoError(_) => 1,
        }
    }

    /// Whether the run failed before any network attempt was made
    pub fn is_configuration(&self) -> bool {
        self.exit_code() == EXIT_CONFIG
    }
}

fn show(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("<missing>")
}

/// Convert TOML deserialization errors to configuration errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_connection_string_lists_missing_fields() {
        let err = Error::ConnectionString {
            host: Some("not-a-url".to_string()),
            user: None,
            database: None,
        };

        assert_eq!(
            err.to_string(),
            "Failed to parse host/user/db from connection string \
             (host=not-a-url user=<missing> db=<missing>)"
        );
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert!(err.is_configuration());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::ConfigError("x".into()).exit_code(), 2);
        assert_eq!(Error::InvalidPort("abc".into()).exit_code(), 2);
        assert_eq!(
            Error::IoError(std::io::Error::new(std::io::ErrorKind::Other, "boom")).exit_code(),
            1
        );
    }
}
