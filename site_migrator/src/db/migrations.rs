//! Migration execution
//!
//! Applies the `admin_api_url` schema change with a bounded retry loop. Each
//! attempt tries the explicit host/port strategy first and the encoded URI
//! strategy second; when both fail the loop sleeps for a deterministic backoff
//! and tries again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::db::connection::{host_port, ConnectionSpec};
use crate::db::executor::{AttemptResult, ClientInvocation, CommandRunner, ConnectMethod};
use crate::error::{Error, Result};
use crate::utils::redact::Redactor;

/// The schema change this tool applies. Both guards make it safe to rerun.
pub const ADD_ADMIN_API_URL_SQL: &str =
    "ALTER TABLE IF EXISTS public.site_settings ADD COLUMN IF NOT EXISTS admin_api_url text;";

/// Causes worth checking when every attempt failed
pub const LIKELY_CAUSES: [&str; 4] = [
    "the runner has no route to the database host (e.g. DNS only returned IPv6 addresses)",
    "the user or password in the connection string is wrong",
    "the database is paused, restarting, or refusing connections on that port",
    "a firewall or network restriction blocks outbound traffic to the port",
];

/// Delay after failed attempt `attempt` (1-based): `attempt * 3 + attempt % 3`
/// seconds. Deterministic so CI retries are reproducible.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt) * 3 + u64::from(attempt % 3))
}

/// Sleep capability used between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Progress through the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_number: u32,
    pub backoff_delay: Duration,
}

impl RetryState {
    pub fn first() -> Self {
        Self {
            attempt_number: 1,
            backoff_delay: backoff_delay(1),
        }
    }

    pub fn advance(self) -> Self {
        let attempt_number = self.attempt_number + 1;
        Self {
            attempt_number,
            backoff_delay: backoff_delay(attempt_number),
        }
    }
}

/// Successful application of the migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub attempt: u32,
    pub method: ConnectMethod,
}

/// Diagnostic report printed when every attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustionSummary {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for ExhaustionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All attempts failed; migration not applied")?;
        writeln!(f, "  target:   {}", host_port(&self.host, self.port))?;
        writeln!(f, "  database: {}", self.database)?;
        writeln!(f, "  user:     {}", self.user)?;
        writeln!(f, "  attempts: {}", self.attempts)?;
        writeln!(f, "  finished: {}", self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        write!(f, "Likely causes:")?;
        for (i, cause) in LIKELY_CAUSES.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, cause)?;
        }
        Ok(())
    }
}

/// Runs the migration statement against one target with bounded retry
pub struct MigrationExecutor<'a> {
    runner: &'a dyn CommandRunner,
    sleeper: &'a dyn Sleeper,
    database: &'a DatabaseConfig,
    redactor: Redactor,
    max_attempts: u32,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        sleeper: &'a dyn Sleeper,
        database: &'a DatabaseConfig,
        redactor: Redactor,
        max_attempts: u32,
    ) -> Self {
        Self {
            runner,
            sleeper,
            database,
            redactor,
            max_attempts,
        }
    }

    /// Apply [`ADD_ADMIN_API_URL_SQL`], connecting to `host` (the resolved
    /// address or the original hostname).
    pub async fn apply(&self, spec: &ConnectionSpec, host: &str) -> Result<MigrationOutcome> {
        let mut state = RetryState::first();

        loop {
            let attempt = state.attempt_number;

            for invocation in [
                ClientInvocation::explicit(self.database, spec, host, ADD_ADMIN_API_URL_SQL),
                ClientInvocation::encoded_uri(self.database, spec, host, ADD_ADMIN_API_URL_SQL),
            ] {
                tracing::info!(
                    attempt = attempt,
                    max_attempts = self.max_attempts,
                    method = %invocation.method,
                    "Attempting migration"
                );

                let output = self.runner.run(&invocation).await;
                let result = AttemptResult::new(invocation.method, output);
                self.log_attempt(attempt, &result);

                if result.succeeded() {
                    tracing::info!(
                        attempt = attempt,
                        method = %result.method,
                        "Migration applied successfully"
                    );
                    return Ok(MigrationOutcome {
                        attempt,
                        method: result.method,
                    });
                }
            }

            if attempt >= self.max_attempts {
                break;
            }

            tracing::warn!(
                attempt = attempt,
                delay_secs = state.backoff_delay.as_secs(),
                "Both connection strategies failed; retrying after backoff"
            );
            self.sleeper.sleep(state.backoff_delay).await;
            state = state.advance();
        }

        let summary = ExhaustionSummary {
            host: spec.host.clone(),
            port: spec.port,
            database: spec.database.clone(),
            user: spec.user.clone(),
            attempts: state.attempt_number,
            finished_at: Utc::now(),
        };
        tracing::error!(
            target_addr = %host_port(&summary.host, summary.port),
            attempts = summary.attempts,
            "All attempts failed; migration not applied"
        );

        Err(Error::AttemptsExhausted(Box::new(summary)))
    }

    fn log_attempt(&self, attempt: u32, result: &AttemptResult) {
        let stdout = self.redactor.redact(result.stdout.trim_end());
        let stderr = self.redactor.redact(result.stderr.trim_end());

        if !stdout.is_empty() {
            tracing::info!(attempt = attempt, method = %result.method, "stdout:\n{}", stdout);
        }
        if !stderr.is_empty() {
            tracing::info!(attempt = attempt, method = %result.method, "stderr:\n{}", stderr);
        }
        if !result.succeeded() {
            tracing::warn!(
                attempt = attempt,
                method = %result.method,
                exit_code = result.exit_code,
                "Connection attempt failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1, 4)]
    #[case(2, 8)]
    #[case(3, 9)]
    #[case(4, 13)]
    #[case(5, 17)]
    #[case(6, 18)]
    #[case(7, 22)]
    #[case(8, 26)]
    #[case(9, 27)]
    #[case(10, 31)]
    fn test_backoff_delay(#[case] attempt: u32, #[case] secs: u64) {
        assert_eq!(backoff_delay(attempt), Duration::from_secs(secs));
    }

    #[test]
    fn test_backoff_is_non_decreasing() {
        for attempt in 1..10 {
            assert!(backoff_delay(attempt) <= backoff_delay(attempt + 1));
        }
    }

    #[test]
    fn test_retry_state_advances() {
        let state = RetryState::first();
        assert_eq!(state.attempt_number, 1);
        assert_eq!(state.backoff_delay, Duration::from_secs(4));

        let state = state.advance().advance().advance();
        assert_eq!(state.attempt_number, 4);
        assert_eq!(state.backoff_delay, Duration::from_secs(13));
    }

    #[test]
    fn test_statement_is_guarded() {
        assert_eq!(
            ADD_ADMIN_API_URL_SQL,
            "ALTER TABLE IF EXISTS public.site_settings \
             ADD COLUMN IF NOT EXISTS admin_api_url text;"
        );
        assert!(ADD_ADMIN_API_URL_SQL.contains("IF EXISTS"));
        assert!(ADD_ADMIN_API_URL_SQL.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_summary_lists_target_and_causes() {
        let summary = ExhaustionSummary {
            host: "db.example.com".to_string(),
            port: 5432,
            database: "app".to_string(),
            user: "svc".to_string(),
            attempts: 10,
            finished_at: Utc::now(),
        };

        let rendered = summary.to_string();
        assert!(rendered.contains("target:   db.example.com:5432"));
        assert!(rendered.contains("database: app"));
        assert!(rendered.contains("user:     svc"));
        assert!(rendered.contains("attempts: 10"));
        for cause in LIKELY_CAUSES {
            assert!(rendered.contains(cause));
        }
    }
}
