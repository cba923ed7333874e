// Command execution on monitored hosts.
//
// Every command opens its own session and tears it down afterwards; there is
// no connection reuse. Connect, authentication and timeout failures all come
// back as a `RemoteError`.
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::HostConfig;
use crate::error::RemoteError;

/// ssh reserves exit status 255 for its own failures.
const SSH_FAILURE_STATUS: i32 = 255;

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs `command` on `host` and returns its standard output, or its
    /// standard error when standard output is empty.
    async fn run(&self, host: &HostConfig, command: &str) -> Result<String, RemoteError>;
}

/// Runs commands through the system `ssh` client in batch mode.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: String,
    command_timeout: Duration,
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(command_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            program: "ssh".to_string(),
            command_timeout,
            connect_timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn build_command(&self, host: &HostConfig, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o").arg("BatchMode=yes")
            .arg("-o").arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-o").arg("StrictHostKeyChecking=accept-new")
            .arg("-p").arg(host.port.to_string());
        if let Some(key) = &host.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg("--").arg(host.destination()).arg(command);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &HostConfig, command: &str) -> Result<String, RemoteError> {
        tracing::debug!(host = %host.host, command, "ssh exec");
        let cmd = self.build_command(host, command);
        let output = run_with_timeout(cmd, &self.program, &host.host, self.command_timeout).await?;

        if output.status.code() == Some(SSH_FAILURE_STATUS) {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RemoteError::Connection {
                host: host.host.clone(),
                message: if stderr.is_empty() { "ssh session failed".to_string() } else { stderr },
            });
        }

        Ok(effective_output(&host.host, &output.stdout, &output.stderr))
    }
}

/// Runs commands on this machine through `sh -c`.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    command_timeout: Duration,
}

impl LocalExecutor {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, host: &HostConfig, command: &str) -> Result<String, RemoteError> {
        tracing::debug!(host = %host.host, command, "local exec");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        let output = run_with_timeout(cmd, "sh", &host.host, self.command_timeout).await?;
        Ok(effective_output(&host.host, &output.stdout, &output.stderr))
    }
}

/// Dispatches to the local or ssh executor depending on the host entry.
pub struct HostExecutor {
    ssh: SshExecutor,
    local: LocalExecutor,
}

impl HostExecutor {
    pub fn new(command_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            ssh: SshExecutor::new(command_timeout, connect_timeout),
            local: LocalExecutor::new(command_timeout),
        }
    }
}

#[async_trait]
impl RemoteExecutor for HostExecutor {
    async fn run(&self, host: &HostConfig, command: &str) -> Result<String, RemoteError> {
        if host.local {
            self.local.run(host, command).await
        } else {
            self.ssh.run(host, command).await
        }
    }
}

async fn run_with_timeout(
    mut cmd: Command,
    program: &str,
    host: &str,
    limit: Duration,
) -> Result<std::process::Output, RemoteError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| RemoteError::Spawn {
        program: program.to_string(),
        source,
    })?;

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(RemoteError::Connection {
            host: host.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(RemoteError::Timeout {
            host: host.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

/// Tool errors go to stderr; when stdout is empty they are still returned
/// as text so they can be parsed and shown.
// TODO: report stderr-only output as its own degraded-output error kind
// once callers can display it separately from status text.
fn effective_output(host: &str, stdout: &[u8], stderr: &[u8]) -> String {
    let out = String::from_utf8_lossy(stdout);
    if out.is_empty() {
        let err = String::from_utf8_lossy(stderr);
        if !err.is_empty() {
            tracing::debug!(host, "empty stdout, using stderr as output");
            return err.into_owned();
        }
    }
    out.into_owned()
}
