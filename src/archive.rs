use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::cancel::CancellationToken;
use crate::error::{Result, StreamError};
use crate::exec::RemoteExec;

/// Local staging path used while pushing: the archive built from the
/// source directory before it is streamed out chunk by chunk.
pub fn local_push_staging_path() -> PathBuf {
    std::env::temp_dir().join(format!(".sshx_push_{}.tar.gz", std::process::id()))
}

/// Local staging path used while pulling: where remote chunks land before
/// extraction.
pub fn local_pull_staging_path() -> PathBuf {
    std::env::temp_dir().join(".sshx_partial_pull.tar.gz")
}

/// Remote staging path used while pushing: `<remote_path>/.sshx_partial.tar.gz`.
pub fn remote_push_staging_path(remote_path: &str) -> String {
    format!("{}/.sshx_partial.tar.gz", remote_path.trim_end_matches('/'))
}

/// Remote staging path used while pulling: the tarball the remote builds
/// of its own directory before we fetch it.
pub fn remote_pull_source_path(remote_path: &str) -> String {
    format!("{}/.sshx_remote_tmp.tar.gz", remote_path.trim_end_matches('/'))
}

/// Build a local tarball of `src_dir` at `dest`, returning its size.
/// `tar -czf <dest> -C parent(src_dir) basename(src_dir)`.
pub fn create_local_archive(src_dir: &Path, dest: &Path) -> Result<u64> {
    let parent = src_dir.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let base = src_dir
        .file_name()
        .ok_or_else(|| StreamError::ArchiveCorrupted(format!("no file name in {}", src_dir.display())))?;

    log::debug!("archiving {} -> {}", src_dir.display(), dest.display());
    let status = Command::new("tar")
        .arg("-czf")
        .arg(dest)
        .arg("-C")
        .arg(parent)
        .arg(base)
        .status()?;

    if !status.success() {
        return Err(StreamError::ArchiveCorrupted(format!("local tar exited with {}", status)));
    }

    Ok(std::fs::metadata(dest)?.len())
}

/// Ask the remote to materialise its directory as a single tarball and
/// report its size, via `tar -czf <remote_tmp> -C <remote_path> .` then
/// `stat -c%s <remote_tmp>`.
pub fn create_remote_archive(
    channel: &dyn RemoteExec,
    remote_path: &str,
    remote_tmp: &str,
    token: &CancellationToken,
) -> Result<u64> {
    channel.run(&tar_create_remote_cmd(remote_tmp, remote_path), token)?;

    let size_str = channel.run(&stat_size_cmd(remote_tmp), token)?;
    size_str
        .trim()
        .parse()
        .map_err(|_| StreamError::ArchiveCorrupted(format!("could not parse size of {}", remote_tmp)))
}

/// Read a remote file's size via `stat`, defaulting to 0 if it doesn't
/// exist (used to detect a prior partial transfer).
pub fn stat_remote_or_zero(channel: &dyn RemoteExec, remote_file: &str, token: &CancellationToken) -> Result<u64> {
    let out = channel.run(&stat_or_zero_cmd(remote_file), token)?;
    out.trim().parse().map_err(|_| StreamError::ArchiveCorrupted(format!("could not parse size of {}", remote_file)))
}

fn tar_create_remote_cmd(remote_tmp: &str, remote_path: &str) -> String {
    format!("tar -czf \"{}\" -C \"{}\" .", remote_tmp, remote_path)
}

fn stat_size_cmd(remote_file: &str) -> String {
    format!("stat -c%s \"{}\"", remote_file)
}

fn stat_or_zero_cmd(remote_file: &str) -> String {
    format!("stat -c%s \"{}\" 2>/dev/null || echo 0", remote_file)
}

fn verify_archive_cmd(remote_partial: &str) -> String {
    format!("tar -tzf \"{}\" > /dev/null", remote_partial)
}

fn extract_archive_cmd(remote_partial: &str, remote_path: &str) -> String {
    format!(
        "mkdir -p \"{}\" && tar -xzf \"{}\" -C \"{}\" && rm -f \"{}\"",
        remote_path, remote_partial, remote_path, remote_partial
    )
}

/// Read a local file's size, defaulting to 0 if it doesn't exist.
pub fn stat_local_or_zero(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Validate and extract a remote archive in place, then remove the
/// staging file. Push's final step.
pub fn verify_and_extract_remote(
    channel: &dyn RemoteExec,
    remote_partial: &str,
    remote_path: &str,
    token: &CancellationToken,
) -> Result<()> {
    channel
        .run(&verify_archive_cmd(remote_partial), token)
        .map_err(|_| StreamError::ArchiveCorrupted(remote_partial.to_string()))?;

    channel
        .run(&extract_archive_cmd(remote_partial, remote_path), token)
        .map_err(|_| StreamError::ExtractionFailed(remote_partial.to_string()))?;

    Ok(())
}

/// Validate and extract a local archive in place, then remove the staging
/// file. Pull's final step.
pub fn verify_and_extract_local(local_partial: &Path, local_dir: &Path) -> Result<()> {
    let status = Command::new("tar")
        .arg("-tzf")
        .arg(local_partial)
        .stdout(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(StreamError::ArchiveCorrupted(local_partial.display().to_string()));
    }

    std::fs::create_dir_all(local_dir)?;
    let status = Command::new("tar")
        .arg("-xzf")
        .arg(local_partial)
        .arg("-C")
        .arg(local_dir)
        .status()?;
    if !status.success() {
        return Err(StreamError::ExtractionFailed(local_partial.display().to_string()));
    }

    std::fs::remove_file(local_partial)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_push_staging_path_appends_marker_file() {
        assert_eq!(remote_push_staging_path("/home/alice/data"), "/home/alice/data/.sshx_partial.tar.gz");
    }

    #[test]
    fn remote_push_staging_path_strips_trailing_slash() {
        assert_eq!(remote_push_staging_path("/home/alice/data/"), "/home/alice/data/.sshx_partial.tar.gz");
    }

    #[test]
    fn remote_pull_source_path_appends_marker_file() {
        assert_eq!(remote_pull_source_path("/home/alice/data"), "/home/alice/data/.sshx_remote_tmp.tar.gz");
    }

    #[test]
    fn local_pull_staging_path_is_a_fixed_name_under_temp_dir() {
        let path = local_pull_staging_path();
        assert_eq!(path, std::env::temp_dir().join(".sshx_partial_pull.tar.gz"));
    }

    #[test]
    fn local_push_staging_path_is_process_scoped_under_temp_dir() {
        let path = local_push_staging_path();
        assert_eq!(path, std::env::temp_dir().join(format!(".sshx_push_{}.tar.gz", std::process::id())));
    }

    #[test]
    fn tar_create_remote_cmd_archives_the_directory_contents() {
        assert_eq!(
            tar_create_remote_cmd("/tmp/x.tar.gz", "/home/alice/data"),
            "tar -czf \"/tmp/x.tar.gz\" -C \"/home/alice/data\" ."
        );
    }

    #[test]
    fn stat_size_cmd_has_no_fallback() {
        assert_eq!(stat_size_cmd("/tmp/x.tar.gz"), "stat -c%s \"/tmp/x.tar.gz\"");
    }

    #[test]
    fn stat_or_zero_cmd_falls_back_to_zero() {
        assert_eq!(stat_or_zero_cmd("/tmp/x.tar.gz"), "stat -c%s \"/tmp/x.tar.gz\" 2>/dev/null || echo 0");
    }

    #[test]
    fn verify_archive_cmd_lists_without_output() {
        assert_eq!(verify_archive_cmd("/tmp/x.tar.gz"), "tar -tzf \"/tmp/x.tar.gz\" > /dev/null");
    }

    #[test]
    fn extract_archive_cmd_extracts_then_removes_staging_file() {
        assert_eq!(
            extract_archive_cmd("/tmp/x.tar.gz", "/home/alice/data"),
            "mkdir -p \"/home/alice/data\" && tar -xzf \"/tmp/x.tar.gz\" -C \"/home/alice/data\" && rm -f \"/tmp/x.tar.gz\""
        );
    }
}
