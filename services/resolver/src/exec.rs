//! External process execution.
//!
//! Every call to `oc` and `skopeo` goes through a [`CommandRunner`], so the
//! release inspector can be exercised without the real tools installed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("failed to create temporary file: {0}")]
    TempFile(#[source] std::io::Error),
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Process runner interface.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to exit. A `timeout` of
    /// `None` waits indefinitely.
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError>;

    /// Create a temporary file, readable and writable by the owner only,
    /// removed when the handle is dropped.
    fn temp_file(&self, dir: Option<&Path>, prefix: &str) -> Result<NamedTempFile, ExecError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        file.map_err(ExecError::TempFile)
    }
}

/// Runs commands as child processes of the service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError> {
        debug!(program = %program, args = ?args, "Spawning command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                ExecError::Timeout {
                    program: program.to_string(),
                    timeout: limit,
                }
            })?,
            None => child.await,
        }
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal.
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
