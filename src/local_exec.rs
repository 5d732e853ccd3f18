use std::io::Write;
use std::process::{Command, Stdio};

use crate::cancel::CancellationToken;
use crate::error::{Result, StreamError};
use crate::exec::RemoteExec;

/// A `RemoteExec` backend that runs commands through `sh -c` on the local
/// machine instead of over SSH. The push/pull engine only ever deals in
/// absolute paths, so this is enough to exercise the full transfer logic
/// against a plain scratch directory in tests, with no live SSH server.
pub struct LocalShellExec;

impl LocalShellExec {
    pub fn new() -> Self {
        LocalShellExec
    }
}

impl Default for LocalShellExec {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteExec for LocalShellExec {
    fn run(&self, cmd: &str, token: &CancellationToken) -> Result<String> {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let _guard = token.track(child.id());

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(StreamError::RemoteCommandFailed {
                cmd: cmd.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    fn run_bin(&self, cmd: &str, token: &CancellationToken) -> Result<Vec<u8>> {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let _guard = token.track(child.id());

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(StreamError::RemoteCommandFailed {
                cmd: cmd.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        Ok(output.stdout)
    }

    fn pipe_in(&self, cmd: &str, bytes: &[u8], token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let _guard = token.track(child.id());

        {
            let mut stdin = child.stdin.take().expect("stdin was piped");
            stdin.write_all(bytes)?;
            stdin.flush()?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(StreamError::RemoteCommandFailed {
                cmd: cmd.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        Ok(())
    }
}
