use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::archive::{self, local_pull_staging_path, remote_pull_source_path};
use crate::cancel::CancellationToken;
use crate::config::StreamConfig;
use crate::control::ControlChannel;
use crate::error::{Result, StreamError};
use crate::exec::RemoteExec;
use crate::hash::{parse_remote_hash, sha256_hex};
use crate::io_util::write_at;
use crate::planner::ChunkPlanner;
use crate::pool::run_pool;
use crate::progress::{ProgressPrinter, TransferStats};
use crate::target::TargetSpec;

/// Pull `remote_path` on `target` into `local_dir`, resuming any prior
/// partial transfer found locally.
pub fn pull(target: &TargetSpec, remote_path: &str, local_dir: &Path, cfg: &StreamConfig, token: &CancellationToken) -> Result<()> {
    let channel: Arc<dyn RemoteExec> = Arc::new(ControlChannel::connect(target, cfg.control_persist_secs)?);
    pull_with_channel(channel, remote_path, local_dir, cfg, token)
}

/// Same as `pull`, but against an already-established channel. Split out so
/// tests can drive the transfer logic against a fake local channel instead
/// of a live SSH master.
pub fn pull_with_channel(
    channel: Arc<dyn RemoteExec>,
    remote_path: &str,
    local_dir: &Path,
    cfg: &StreamConfig,
    token: &CancellationToken,
) -> Result<()> {
    let remote_tmp = remote_pull_source_path(remote_path);
    let total_bytes = archive::create_remote_archive(&channel, remote_path, &remote_tmp, token)?;
    log::info!("remote archived {} to {} bytes", remote_path, total_bytes);

    let local_tmp = local_pull_staging_path();
    let planner = ChunkPlanner::new(total_bytes, cfg.chunk_size);

    let existing_size = archive::stat_local_or_zero(&local_tmp)?;
    let resume = planner.resume_pull(existing_size);
    if resume.start_chunk == 0 && existing_size != 0 {
        log::warn!("local partial {} is corrupt, restarting from 0", local_tmp.display());
        let _ = std::fs::remove_file(&local_tmp);
    }
    if resume.start_chunk > 0 {
        log::info!("resuming pull from chunk {}", resume.start_chunk);
    }

    let local_file = open_local_staging(&local_tmp, total_bytes)?;

    let remote_hashes = prefetch_remote_hashes(&channel, &remote_tmp, cfg.chunk_size, resume.start_chunk, planner.total_chunks, token)?;

    let stats = TransferStats::new(resume.bytes_already_transferred);
    let printer = ProgressPrinter::start(Arc::clone(&stats), total_bytes);

    let local_file = Arc::new(Mutex::new(local_file));
    let result = {
        let remote_tmp = remote_tmp.clone();
        let channel = Arc::clone(&channel);
        let stats = Arc::clone(&stats);
        let local_file = Arc::clone(&local_file);
        let remote_hashes = Arc::new(remote_hashes);
        let start_chunk = resume.start_chunk;
        let max_retry = cfg.max_retry;
        let token_for_pool = token.clone();
        let token_for_worker = token.clone();

        run_pool(resume.start_chunk, planner.total_chunks, cfg.workers, &token_for_pool, move |index| {
            pull_chunk(
                &planner,
                index,
                start_chunk,
                &remote_hashes,
                &remote_tmp,
                &channel,
                &local_file,
                &stats,
                max_retry,
                &token_for_worker,
            )
        })
    };

    printer.stop();
    result?;

    channel.run(&format!("rm -f \"{}\"", remote_tmp), token)?;
    archive::verify_and_extract_local(&local_tmp, local_dir)?;

    println!("✅ pull completed");
    Ok(())
}

fn open_local_staging(path: &Path, total_bytes: u64) -> Result<File> {
    let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
    file.set_len(total_bytes)?;
    Ok(file)
}

/// Fetch the SHA-256 of every remote chunk from `start_chunk` onward in a
/// single round trip, via a small shell loop over `dd | sha256sum`.
fn prefetch_remote_hashes(
    channel: &dyn RemoteExec,
    remote_tmp: &str,
    chunk_size: u64,
    start_chunk: usize,
    total_chunks: usize,
    token: &CancellationToken,
) -> Result<Vec<[u8; 32]>> {
    if start_chunk >= total_chunks {
        return Ok(Vec::new());
    }

    let script = prefetch_hashes_script(remote_tmp, chunk_size, start_chunk, total_chunks);
    let output = channel.run(&script, token)?;
    let lines: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let expected = total_chunks - start_chunk;
    if lines.len() != expected {
        return Err(StreamError::RemoteHashCountMismatch { expected, got: lines.len() });
    }

    lines.into_iter().map(parse_remote_hash).collect()
}

fn prefetch_hashes_script(remote_tmp: &str, chunk_size: u64, start_chunk: usize, total_chunks: usize) -> String {
    format!(
        "i={start}; while [ \"$i\" -lt {total} ]; do dd if=\"{file}\" bs={bs} skip=\"$i\" count=1 2>/dev/null | sha256sum | awk '{{print $1}}'; i=$((i+1)); done",
        start = start_chunk,
        total = total_chunks,
        file = remote_tmp,
        bs = chunk_size,
    )
}

#[allow(clippy::too_many_arguments)]
fn pull_chunk(
    planner: &ChunkPlanner,
    index: usize,
    start_chunk: usize,
    remote_hashes: &[[u8; 32]],
    remote_tmp: &str,
    channel: &dyn RemoteExec,
    local_file: &Mutex<File>,
    stats: &TransferStats,
    max_retry: u32,
    token: &CancellationToken,
) -> Result<()> {
    let (start, end) = planner.chunk_range(index);
    let len = (end - start) as usize;
    let expected = remote_hashes[index - start_chunk];
    let expected_hex = hex::encode(expected);

    let mut attempt: u32 = 0;
    loop {
        if token.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        let read_cmd = read_chunk_cmd(remote_tmp, planner.chunk_size, index);

        let attempt_result = (|| -> Result<()> {
            let bytes = channel.run_bin(&read_cmd, token)?;
            if bytes.len() != len {
                return Err(StreamError::HashMismatch { index });
            }
            if sha256_hex(&bytes) != expected_hex {
                return Err(StreamError::HashMismatch { index });
            }
            {
                let file = local_file.lock().unwrap();
                write_at(&file, &bytes, start)?;
            }
            stats.add(len as u64);
            Ok(())
        })();

        match attempt_result {
            Ok(()) => return Ok(()),
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

fn read_chunk_cmd(remote_tmp: &str, chunk_size: u64, index: usize) -> String {
    format!("dd if=\"{}\" bs={} skip={} count=1 2>/dev/null", remote_tmp, chunk_size, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_chunk_cmd_reads_one_chunk_at_the_given_index() {
        assert_eq!(read_chunk_cmd("/tmp/x.tar.gz", 4096, 3), "dd if=\"/tmp/x.tar.gz\" bs=4096 skip=3 count=1 2>/dev/null");
    }

    #[test]
    fn prefetch_hashes_script_covers_only_the_requested_range() {
        let script = prefetch_hashes_script("/tmp/x.tar.gz", 4096, 2, 5);
        assert_eq!(
            script,
            "i=2; while [ \"$i\" -lt 5 ]; do dd if=\"/tmp/x.tar.gz\" bs=4096 skip=\"$i\" count=1 2>/dev/null | sha256sum | awk '{print $1}'; i=$((i+1)); done"
        );
    }
}
