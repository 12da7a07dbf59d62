//! site_migrator: applies the storefront's `admin_api_url` schema migration
//!
//! The connection string comes from one environment variable. The runner
//! parses it, prefers an IPv4 path to the database host, and drives the
//! external database client through a bounded retry loop with two connection
//! strategies per attempt.

pub mod config;
pub mod db;
pub mod error;
pub mod utils;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::ConnectionSpec;
pub use db::migrations::{MigrationOutcome, ADD_ADMIN_API_URL_SQL};
pub use error::{Error, Result};

use db::diagnostics;
use db::executor::{CommandRunner, ProcessRunner};
use db::migrations::{MigrationExecutor, Sleeper, TokioSleeper};
use db::resolver::{self, Resolve, ResolvedHost, SystemResolver};
use utils::redact::Redactor;

/// Read the connection string from `var`. Unset and empty are both errors.
pub fn read_connection_url(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(Error::ConfigError(format!("{} is empty", var))),
        Err(_) => Err(Error::ConfigError(format!("{} is not set", var))),
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The statement ran (or was already satisfied) on the target
    Applied(MigrationOutcome),
    /// Dry run: parsed and resolved, client never invoked
    DryRun { target: ResolvedHost },
}

/// The main client: owns configuration and the injected capabilities
pub struct MigrationRunner {
    config: Config,
    runner: Box<dyn CommandRunner>,
    resolver: Box<dyn Resolve>,
    sleeper: Box<dyn Sleeper>,
}

impl MigrationRunner {
    /// Create a runner that launches real processes and uses system DNS
    pub fn new(config: Config) -> Result<Self> {
        let resolver = SystemResolver::new(config.diagnostics.dns_timeout());
        Self::with_components(
            config,
            Box::new(ProcessRunner),
            Box::new(resolver),
            Box::new(TokioSleeper),
        )
    }

    /// Create a runner with explicit capabilities
    pub fn with_components(
        config: Config,
        runner: Box<dyn CommandRunner>,
        resolver: Box<dyn Resolve>,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self> {
        if config.retry.max_attempts == 0 {
            return Err(Error::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            config,
            runner,
            resolver,
            sleeper,
        })
    }

    /// Read the configured environment variable and run
    pub async fn run(&self) -> Result<RunOutcome> {
        let raw = read_connection_url(&self.config.database.url_env)?;
        self.run_with_url(&raw).await
    }

    /// Parse, diagnose, resolve, then apply the migration (or stop there on a
    /// dry run).
    pub async fn run_with_url(&self, raw: &str) -> Result<RunOutcome> {
        let run_id = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        tracing::info!(run_id = %run_id, "Starting migration run");

        let spec = ConnectionSpec::parse(raw, self.config.database.default_port)?;
        tracing::info!("DBG: {}", spec.describe());

        if self.config.diagnostics.enabled {
            let report = diagnostics::run_preflight(
                self.resolver.as_ref(),
                &spec,
                self.config.diagnostics.probe_timeout(),
            )
            .await;
            diagnostics::log_summary(&report, &spec);
        }

        let target =
            resolver::resolve_preferred_host(self.resolver.as_ref(), &spec.host, spec.port).await;

        if self.config.migrations.dry_run {
            tracing::info!(
                host = %target.host,
                port = spec.port,
                database = %spec.database,
                sql = ADD_ADMIN_API_URL_SQL,
                "Migration SQL (dry run)"
            );
            return Ok(RunOutcome::DryRun { target });
        }

        let executor = MigrationExecutor::new(
            self.runner.as_ref(),
            self.sleeper.as_ref(),
            &self.config.database,
            Redactor::new(&spec, self.config.security.mask_logs),
            self.config.retry.max_attempts,
        );

        let outcome = executor.apply(&spec, &target.host).await?;
        Ok(RunOutcome::Applied(outcome))
    }
}
