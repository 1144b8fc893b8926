//! Bounded execution of external helper tools.

use std::env;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// Captured result of a finished tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit status was zero.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
}

/// Run `program` with `args`, optionally feeding `stdin`, and wait at most
/// `timeout` for it to finish.
///
/// The child is killed if the timeout elapses. A dangling `XAUTHORITY`
/// is removed from the child environment so X11 tools do not fail on it.
///
/// # Errors
///
/// Returns `AppError::Injection` if the tool cannot be spawned, its input
/// cannot be written, or it does not finish in time.
pub async fn run_tool(
    program: impl AsRef<OsStr>,
    args: &[&str],
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<ToolOutput> {
    let program = program.as_ref();
    let label = program.to_string_lossy().into_owned();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(xauth) = env::var_os("XAUTHORITY") {
        if !Path::new(&xauth).exists() {
            debug!(path = ?xauth, "removing invalid XAUTHORITY from tool environment");
            cmd.env_remove("XAUTHORITY");
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Injection(format!("failed to spawn {label}: {err}")))?;

    let run = async {
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }
        child.wait_with_output().await
    };

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| AppError::Injection(format!("{label} timed out after {timeout:?}")))?
        .map_err(|err| AppError::Injection(format!("{label} failed: {err}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        tool = %label,
        code = ?output.status.code(),
        stderr = %stderr.trim(),
        "tool finished"
    );

    Ok(ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

/// Run a tool and collapse every failure mode into `false`.
pub async fn tool_succeeds(
    program: impl AsRef<OsStr>,
    args: &[&str],
    stdin: Option<&str>,
    timeout: Duration,
) -> bool {
    match run_tool(program, args, stdin, timeout).await {
        Ok(output) => output.success,
        Err(err) => {
            debug!(%err, "tool unavailable");
            false
        }
    }
}
