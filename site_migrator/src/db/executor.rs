//! Database client execution
//!
//! The migration is applied by an external command-line client. Launching it
//! goes through the [`CommandRunner`] capability so the retry logic can be
//! exercised against a scripted runner.

use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;

use crate::config::DatabaseConfig;
use crate::db::connection::ConnectionSpec;

/// Connection-establishment strategy used by an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMethod {
    /// `-h host -p port -U user -d db`, password in the environment
    ExplicitHostPort,
    /// One percent-encoded URI argument
    EncodedUri,
}

impl fmt::Display for ConnectMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectMethod::ExplicitHostPort => write!(f, "explicit host/port"),
            ConnectMethod::EncodedUri => write!(f, "encoded URI"),
        }
    }
}

/// A single client process to launch
#[derive(Clone)]
pub struct ClientInvocation {
    pub method: ConnectMethod,
    pub program: String,
    pub args: Vec<String>,
    /// Variables added to the child's environment only
    pub env: Vec<(String, String)>,
}

impl fmt::Debug for ClientInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<_> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("ClientInvocation")
            .field("method", &self.method)
            .field("program", &self.program)
            .field("args", &self.args.len())
            .field("env", &env)
            .finish()
    }
}

impl ClientInvocation {
    /// Discrete connection parameters; the password travels through
    /// `config.password_env` and never appears in the argument list.
    pub fn explicit(
        config: &DatabaseConfig,
        spec: &ConnectionSpec,
        host: &str,
        sql: &str,
    ) -> Self {
        Self {
            method: ConnectMethod::ExplicitHostPort,
            program: config.client.clone(),
            args: vec![
                "-h".to_string(),
                host.to_string(),
                "-p".to_string(),
                spec.port.to_string(),
                "-U".to_string(),
                spec.user.clone(),
                "-d".to_string(),
                spec.database.clone(),
                "-c".to_string(),
                sql.to_string(),
            ],
            env: vec![(config.password_env.clone(), spec.password.clone())],
        }
    }

    /// A single reconstructed URI with user and password percent-encoded
    pub fn encoded_uri(
        config: &DatabaseConfig,
        spec: &ConnectionSpec,
        host: &str,
        sql: &str,
    ) -> Self {
        Self {
            method: ConnectMethod::EncodedUri,
            program: config.client.clone(),
            args: vec![
                spec.to_uri_with_host(host),
                "-c".to_string(),
                sql.to_string(),
            ],
            env: Vec::new(),
        }
    }
}

/// Raw result of running a client process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit status; -1 when the process could not be launched or was
    /// killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub method: ConnectMethod,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl AttemptResult {
    pub fn new(method: ConnectMethod, output: CommandOutput) -> Self {
        Self {
            method,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability to run an external client process to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &ClientInvocation) -> CommandOutput;
}

/// Runs invocations as real child processes
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &ClientInvocation) -> CommandOutput {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => CommandOutput {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("failed to launch {}: {}", invocation.program, e),
            },
        }
    }
}
