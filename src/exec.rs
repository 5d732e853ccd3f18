use crate::cancel::CancellationToken;
use crate::error::Result;

/// The seam between the transfer engine and however a shell command
/// actually reaches the remote side. `ControlChannel` is the production
/// implementation, shelling out to a multiplexed `ssh`; `LocalShellExec`
/// runs commands through `sh -c` directly against a scratch directory so
/// the push/pull logic can be exercised in tests without a live SSH server.
pub trait RemoteExec: Send + Sync {
    /// Run `cmd` and return its stdout with trailing whitespace stripped.
    fn run(&self, cmd: &str, token: &CancellationToken) -> Result<String>;

    /// Run `cmd` and return its raw stdout bytes.
    fn run_bin(&self, cmd: &str, token: &CancellationToken) -> Result<Vec<u8>>;

    /// Run `cmd` while streaming `bytes` to its stdin.
    fn pipe_in(&self, cmd: &str, bytes: &[u8], token: &CancellationToken) -> Result<()>;
}
