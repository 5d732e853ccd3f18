use std::io::Write;
use std::process::{Command, Stdio};

use crate::cancel::CancellationToken;
use crate::error::{Result, StreamError};
use crate::exec::RemoteExec;
use crate::target::TargetSpec;

/// A synchronous handle to a multiplexed SSH master. `run` and `pipe_in`
/// both reuse the same background master, so repeated remote commands pay
/// no per-command handshake cost.
pub struct ControlChannel {
    target: TargetSpec,
}

impl ControlChannel {
    /// Establish the background master with `ControlMaster=yes`,
    /// `ControlPersist=<persist_secs>s`, `ControlPath=<socket_path>`, via
    /// `-fN` (fork to background, no remote command).
    pub fn connect(target: &TargetSpec, persist_secs: u32) -> Result<Self> {
        log::debug!(
            "starting control master for {} at {}",
            target.user_host(),
            target.socket_path
        );
        let status = Command::new("ssh")
            .arg("-M")
            .arg("-S")
            .arg(&target.socket_path)
            .arg("-fN")
            .arg("-p")
            .arg(target.port.to_string())
            .arg("-o")
            .arg(format!("ControlPersist={}s", persist_secs))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg(target.user_host())
            .status()
            .map_err(|e| StreamError::ControlChannelUnavailable(target.user_host(), e.to_string()))?;

        if !status.success() {
            return Err(StreamError::ControlChannelUnavailable(
                target.user_host(),
                format!("ssh master exited with {}", status),
            ));
        }

        Ok(ControlChannel {
            target: target.clone(),
        })
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S").arg(&self.target.socket_path).arg(self.target.user_host());
        cmd
    }

    /// Gracefully tear down the master with `-O exit`. Idempotent; failure
    /// is logged but non-fatal since the master will also expire on its own
    /// via `ControlPersist`.
    pub fn close(&self) {
        let result = Command::new("ssh")
            .arg("-S")
            .arg(&self.target.socket_path)
            .arg("-O")
            .arg("exit")
            .arg(self.target.user_host())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        if let Err(e) = result {
            log::warn!("failed to close control master: {}", e);
        }
    }
}

impl RemoteExec for ControlChannel {
    /// Run `cmd` remotely and return its stdout with trailing whitespace
    /// stripped. Non-zero exit is `RemoteCommandFailed`.
    fn run(&self, cmd: &str, token: &CancellationToken) -> Result<String> {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        log::debug!("remote run: {}", cmd);
        let mut child = self
            .base_command()
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

    /// Run `cmd` remotely and return its raw stdout bytes (used for chunk
    /// reads, where stdout is binary archive data, not text).
    fn run_bin(&self, cmd: &str, token: &CancellationToken) -> Result<Vec<u8>> {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        log::debug!("remote run (binary): {}", cmd);
        let mut child = self
            .base_command()
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

    /// Run `cmd` remotely while streaming `bytes` to its stdin. The stdin
    /// pipe is explicitly dropped before `wait_with_output` so that the
    /// remote process sees EOF and exits instead of deadlocking.
    fn pipe_in(&self, cmd: &str, bytes: &[u8], token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        log::debug!("remote pipe_in ({} bytes): {}", bytes.len(), cmd);
        let mut child = self
            .base_command()
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
        } // stdin dropped here, closing the pipe before we wait

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

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.close();
    }
}
