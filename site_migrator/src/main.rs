use clap::Parser;
use std::process::ExitCode;

use site_migrator::utils::logging;
use site_migrator::{config, Config, Error, MigrationRunner, RunOutcome};

/// Apply the admin_api_url migration to the storefront database
#[derive(Debug, Parser)]
#[command(name = "site_migrator", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Parse and resolve only; never invoke the database client
    #[arg(long)]
    dry_run: bool,

    /// Skip DNS listing and TCP reachability probes
    #[arg(long)]
    skip_diagnostics: bool,

    /// Override the configured number of attempts
    #[arg(long)]
    max_attempts: Option<u32>,
}

impl Cli {
    fn load_config(&self) -> site_migrator::Result<Config> {
        let mut config = match &self.config {
            Some(path) => config::load_from_file(path)?,
            None => Config::default(),
        };

        if self.dry_run {
            config.migrations.dry_run = true;
        }
        if self.skip_diagnostics {
            config.diagnostics.enabled = false;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }

        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => return fail(e),
    };

    if let Err(e) = logging::init_logging(config.logging.as_ref()) {
        return fail(e);
    }

    let runner = match MigrationRunner::new(config) {
        Ok(runner) => runner,
        Err(e) => return fail(e),
    };

    match runner.run().await {
        Ok(RunOutcome::Applied(outcome)) => {
            println!(
                "Migration applied successfully (attempt {}, {})",
                outcome.attempt, outcome.method
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::DryRun { target }) => {
            println!("Dry run complete; would connect to {}", target.host);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn fail(error: Error) -> ExitCode {
    match &error {
        Error::AttemptsExhausted(summary) => eprintln!("{}", summary),
        other => eprintln!("ERROR: {}", other),
    }
    ExitCode::from(error.exit_code())
}
