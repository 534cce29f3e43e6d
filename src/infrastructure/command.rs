use crate::error::{KioskError, Result};
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// What an external tool printed and how it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs `program` to completion, killing it once `timeout` has passed.
///
/// A non-zero exit is not an error here; see [`run_checked`].
pub async fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // The child dies with the future if the timeout drops it.
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| KioskError::CommandError {
        command: program.to_string(),
        detail: format!("failed to spawn: {e}"),
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| KioskError::CommandError {
            command: program.to_string(),
            detail: format!("timed out after {}s", timeout.as_secs()),
        })??;

    let output = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program, code = ?output.code, "command finished");
    Ok(output)
}

/// Like [`run`], but a non-zero exit becomes a [`KioskError::CommandError`].
pub async fn run_checked<I, S>(program: &str, args: I, timeout: Duration) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program, args, timeout).await?;
    if !output.success() {
        return Err(KioskError::CommandError {
            command: program.to_string(),
            detail: format!(
                "exit code {:?}: {}",
                output.code,
                output.stderr.trim()
            ),
        });
    }
    Ok(output.stdout)
}
