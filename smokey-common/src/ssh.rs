//! Remote command execution.
//!
//! Every invocation opens its own SSH session, runs one shell command, and
//! closes the session again. Sessions are never shared between runs.

use crate::config::SshConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors running a remote command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("could not connect to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("could not run `{command}` on {host}: {message}")]
    Spawn {
        host: String,
        command: String,
        message: String,
    },

    #[error("`{command}` on {host} exited with status {status}: {stderr}")]
    NonZeroExit {
        host: String,
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },
}

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<String>,
    pub status: i32,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    /// Successful output with the given stdout lines.
    pub fn success<I, S>(stdout: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: stdout.into_iter().map(Into::into).collect(),
            status: 0,
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given status and stderr text.
    pub fn failure(status: i32, stderr: &str) -> Self {
        Self {
            stdout: Vec::new(),
            status,
            stderr: split_lines(stderr.as_bytes()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Turn a non-zero exit status into [`CommandError::NonZeroExit`].
    pub fn check(self, host: &str, command: &str) -> Result<Self, CommandError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(CommandError::NonZeroExit {
            host: host.to_string(),
            command: command.to_string(),
            status: self.status,
            stdout: self.stdout.join("\n"),
            stderr: self.stderr.join("\n"),
        })
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Runs a shell command on a remote host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, CommandError>;
}

/// The production executor for this platform.
pub fn default_executor(config: &SshConfig) -> Arc<dyn RemoteExecutor> {
    #[cfg(unix)]
    {
        Arc::new(OpensshExecutor::from_config(config))
    }
    #[cfg(not(unix))]
    {
        Arc::new(UnsupportedExecutor {
            user: config.user.clone(),
        })
    }
}

#[cfg(unix)]
pub use self::openssh_impl::OpensshExecutor;

#[cfg(unix)]
mod openssh_impl {
    use super::{CommandError, CommandOutput, RemoteExecutor, split_lines};
    use crate::config::SshConfig;
    use async_trait::async_trait;
    use openssh::{KnownHosts, SessionBuilder};
    use std::path::PathBuf;
    use std::time::Duration;
    use tracing::{debug, info, warn};

    /// [`RemoteExecutor`] backed by the system `ssh` via `openssh`.
    #[derive(Debug, Clone)]
    pub struct OpensshExecutor {
        user: String,
        identity_file: Option<PathBuf>,
        connect_timeout: Duration,
    }

    impl OpensshExecutor {
        pub fn from_config(config: &SshConfig) -> Self {
            Self {
                user: config.user.clone(),
                identity_file: config.identity_file.clone(),
                connect_timeout: config.connect_timeout,
            }
        }
    }

    #[async_trait]
    impl RemoteExecutor for OpensshExecutor {
        async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, CommandError> {
            let mut builder = SessionBuilder::default();
            builder
                .user(self.user.clone())
                .known_hosts_check(KnownHosts::Accept)
                .connect_timeout(self.connect_timeout);
            if let Some(key) = &self.identity_file {
                builder.keyfile(key);
            }

            debug!(%host, user = %self.user, "Opening SSH session");
            let session = builder
                .connect(host)
                .await
                .map_err(|e| CommandError::Connect {
                    host: host.to_string(),
                    message: e.to_string(),
                })?;

            info!(%host, %command, "Running remote command");
            let result = session.shell(command).output().await;
            if let Err(e) = session.close().await {
                warn!(%host, error = %e, "Failed to close SSH session");
            }
            let output = result.map_err(|e| CommandError::Spawn {
                host: host.to_string(),
                command: command.to_string(),
                message: e.to_string(),
            })?;

            let output = CommandOutput {
                stdout: split_lines(&output.stdout),
                status: output.status.code().unwrap_or(-1),
                stderr: split_lines(&output.stderr),
            };
            debug!(%host, status = output.status, stdout = ?output.stdout, stderr = ?output.stderr, "Remote command finished");
            Ok(output)
        }
    }
}

/// Fallback for platforms without the system `ssh` multiplexer.
#[cfg(not(unix))]
pub struct UnsupportedExecutor {
    user: String,
}

#[cfg(not(unix))]
#[async_trait]
impl RemoteExecutor for UnsupportedExecutor {
    async fn run(&self, host: &str, _command: &str) -> Result<CommandOutput, CommandError> {
        Err(CommandError::Connect {
            host: host.to_string(),
            message: format!("remote execution as {} requires a unix host", self.user),
        })
    }
}
