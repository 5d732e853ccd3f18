use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{self, local_push_staging_path, remote_push_staging_path};
use crate::cancel::CancellationToken;
use crate::config::StreamConfig;
use crate::control::ControlChannel;
use crate::error::{Result, StreamError};
use crate::exec::RemoteExec;
use crate::hash::sha256_hex;
use crate::planner::ChunkPlanner;
use crate::pool::run_pool;
use crate::progress::{ProgressPrinter, TransferStats};
use crate::target::TargetSpec;

/// Push `local_dir` to `remote_path` on `target`, resuming any prior
/// partial transfer found on the remote side.
pub fn push(target: &TargetSpec, local_dir: &Path, remote_path: &str, cfg: &StreamConfig, token: &CancellationToken) -> Result<()> {
    let channel: Arc<dyn RemoteExec> = Arc::new(ControlChannel::connect(target, cfg.control_persist_secs)?);
    push_with_channel(channel, local_dir, remote_path, cfg, token)
}

/// Same as `push`, but against an already-established channel. Split out so
/// tests can drive the transfer logic against a fake local channel instead
/// of a live SSH master.
pub fn push_with_channel(
    channel: Arc<dyn RemoteExec>,
    local_dir: &Path,
    remote_path: &str,
    cfg: &StreamConfig,
    token: &CancellationToken,
) -> Result<()> {
    let local_tmp = local_push_staging_path();
    let _cleanup_local = LocalArchiveGuard(local_tmp.clone());
    let total_bytes = archive::create_local_archive(local_dir, &local_tmp)?;
    log::info!("archived {} to {} bytes", local_dir.display(), total_bytes);

    let remote_partial = remote_push_staging_path(remote_path);
    channel.run(&format!("mkdir -p \"{}\"", remote_path), token)?;

    let existing_size = archive::stat_remote_or_zero(&channel, &remote_partial, token)?;
    let planner = ChunkPlanner::new(total_bytes, cfg.chunk_size);
    let resume = planner.resume_push(existing_size)?;
    if resume.start_chunk > 0 {
        log::info!("resuming push from chunk {}", resume.start_chunk);
    }

    let stats = TransferStats::new(resume.bytes_already_transferred);
    let printer = ProgressPrinter::start(Arc::clone(&stats), total_bytes);

    let result = {
        let local_tmp = local_tmp.clone();
        let remote_partial = remote_partial.clone();
        let channel = Arc::clone(&channel);
        let stats = Arc::clone(&stats);
        let max_retry = cfg.max_retry;
        let token_for_pool = token.clone();
        let token_for_worker = token.clone();

        run_pool(resume.start_chunk, planner.total_chunks, cfg.workers, &token_for_pool, move |index| {
            push_chunk(&planner, index, &local_tmp, &remote_partial, &channel, &stats, max_retry, &token_for_worker)
        })
    };

    printer.stop();
    result?;

    archive::verify_and_extract_remote(&channel, &remote_partial, remote_path, token)?;

    println!("✅ push completed");
    Ok(())
}

fn push_chunk(
    planner: &ChunkPlanner,
    index: usize,
    local_tmp: &Path,
    remote_partial: &str,
    channel: &dyn RemoteExec,
    stats: &TransferStats,
    max_retry: u32,
    token: &CancellationToken,
) -> Result<()> {
    let (start, end) = planner.chunk_range(index);
    let len = (end - start) as usize;

    let mut buf = vec![0u8; len];
    {
        let mut file = File::open(local_tmp)?;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf)?;
    }
    let local_hash = sha256_hex(&buf);

    let mut attempt: u32 = 0;
    loop {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let write_cmd = write_chunk_cmd(remote_partial, planner.chunk_size, index);
        let hash_cmd = hash_chunk_cmd(remote_partial, planner.chunk_size, index);

        let attempt_result = (|| -> Result<()> {
            channel.pipe_in(&write_cmd, &buf, token)?;
            let remote_hash = channel.run(&hash_cmd, token)?;
            if remote_hash.trim() != local_hash {
                return Err(StreamError::HashMismatch { index });
            }
            Ok(())
        })();

        match attempt_result {
            Ok(()) => {
                stats.add(len as u64);
                return Ok(());
            }
            Err(StreamError::Cancelled) => return Err(StreamError::Cancelled),
            Err(e) => {
                attempt += 1;
                log::warn!("chunk {} attempt {} failed: {}", index, attempt, e);
                if attempt >= max_retry {
                    return Err(StreamError::ChunkFailed(index));
                }
            }
        }
    }
}

fn write_chunk_cmd(remote_partial: &str, chunk_size: u64, index: usize) -> String {
    format!("dd of=\"{}\" bs={} seek={} conv=notrunc 2>/dev/null", remote_partial, chunk_size, index)
}

fn hash_chunk_cmd(remote_partial: &str, chunk_size: u64, index: usize) -> String {
    format!(
        "dd if=\"{}\" bs={} skip={} count=1 2>/dev/null | sha256sum | awk '{{print $1}}'",
        remote_partial, chunk_size, index
    )
}

/// Removes the local push staging tarball on drop, regardless of outcome.
struct LocalArchiveGuard(PathBuf);

impl Drop for LocalArchiveGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}
