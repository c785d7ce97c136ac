//! Timeout-bounded external process invocation.
//!
//! Every external tool (git, pandoc) runs through [`run_command`], which
//! kills the child when the deadline passes so a stuck process surfaces as
//! an [`ExecError::Timeout`] instead of hanging the build.

use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
}

/// Run `cmd` to completion, optionally feeding `stdin`, within `timeout`.
///
/// A non-zero exit status is not an error here; callers inspect
/// `output.status` and decide.
pub async fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<Output, ExecError> {
    let program = cmd.as_std().get_program().to_string_lossy().to_string();

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;

    // stdin is fed concurrently with draining stdout/stderr.
    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), stdin) {
        let bytes = bytes.to_vec();
        tokio::spawn(async move {
            let _ = pipe.write_all(&bytes).await;
        });
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ExecError::Spawn { program, source }),
        Err(_) => Err(ExecError::Timeout { program, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-binary-4821");
        let err = run_command(cmd, None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_command(cmd, None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_roundtrip() {
        let cmd = Command::new("cat");
        let output = run_command(cmd, Some(&b"hello"[..]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
    }
}
