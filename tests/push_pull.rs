use std::fs;
use std::sync::Arc;

use stream::archive;
use stream::cancel::CancellationToken;
use stream::config::StreamConfig;
use stream::local_exec::LocalShellExec;
use stream::{pull, push};

fn small_config() -> StreamConfig {
    StreamConfig {
        chunk_size: 16,
        max_retry: 2,
        workers: 2,
        control_persist_secs: 60,
    }
}

fn write_fixture(dir: &std::path::Path) {
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("a.txt"), b"hello world, this is a multi-chunk fixture file\n").unwrap();
    fs::write(dir.join("sub/b.txt"), vec![b'x'; 200]).unwrap();
}

#[test]
fn push_then_pull_round_trip() {
    let src = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();

    let payload = src.path().join("payload");
    fs::create_dir_all(&payload).unwrap();
    write_fixture(&payload);

    let remote_path = remote.path().join("remote_copy");
    let channel: Arc<LocalShellExec> = Arc::new(LocalShellExec::new());
    let token = CancellationToken::new();
    let cfg = small_config();

    push::push_with_channel(channel.clone(), &payload, remote_path.to_str().unwrap(), &cfg, &token).unwrap();

    assert!(remote_path.join("a.txt").exists());
    assert!(remote_path.join("sub/b.txt").exists());
    assert_eq!(fs::read(remote_path.join("a.txt")).unwrap(), fs::read(payload.join("a.txt")).unwrap());

    let local_dest = dest.path().join("pulled");
    pull::pull_with_channel(channel, remote_path.to_str().unwrap(), &local_dest, &cfg, &token).unwrap();

    assert_eq!(fs::read(local_dest.join("a.txt")).unwrap(), fs::read(payload.join("a.txt")).unwrap());
    assert_eq!(fs::read(local_dest.join("sub/b.txt")).unwrap(), fs::read(payload.join("sub/b.txt")).unwrap());
}

#[test]
fn push_is_resumable_after_partial_transfer() {
    let src = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let payload = src.path().join("payload");
    fs::create_dir_all(&payload).unwrap();
    write_fixture(&payload);

    let remote_path = remote.path().join("remote_copy");
    let channel: Arc<LocalShellExec> = Arc::new(LocalShellExec::new());
    let token = CancellationToken::new();
    let cfg = small_config();

    // Build the same archive push would build, then seed the remote partial
    // with its first two chunks to simulate a transfer interrupted right
    // after chunk 1 landed.
    let reference_tar = remote.path().join("reference.tar.gz");
    archive::create_local_archive(&payload, &reference_tar).unwrap();
    let full_bytes = fs::read(&reference_tar).unwrap();
    let prefix_len = (cfg.chunk_size * 2).min(full_bytes.len() as u64) as usize;

    let remote_partial = format!("{}/.sshx_partial.tar.gz", remote_path.to_str().unwrap().trim_end_matches('/'));
    fs::create_dir_all(&remote_path).unwrap();
    fs::write(&remote_partial, &full_bytes[..prefix_len]).unwrap();

    push::push_with_channel(channel, &payload, remote_path.to_str().unwrap(), &cfg, &token).unwrap();

    assert_eq!(fs::read(remote_path.join("a.txt")).unwrap(), fs::read(payload.join("a.txt")).unwrap());
}

#[test]
fn pull_discards_corrupt_local_partial_and_restarts() {
    let remote = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let remote_path = remote.path().join("source");
    fs::create_dir_all(&remote_path).unwrap();
    write_fixture(&remote_path);

    let channel: Arc<LocalShellExec> = Arc::new(LocalShellExec::new());
    let token = CancellationToken::new();
    let cfg = small_config();

    let local_tmp = std::env::temp_dir().join(".sshx_partial_pull.tar.gz");
    fs::write(&local_tmp, vec![1u8; 7]).unwrap(); // not chunk-aligned: corrupt

    let local_dest = dest.path().join("pulled");
    pull::pull_with_channel(channel, remote_path.to_str().unwrap(), &local_dest, &cfg, &token).unwrap();

    assert_eq!(fs::read(local_dest.join("a.txt")).unwrap(), fs::read(remote_path.join("a.txt")).unwrap());
    let _ = fs::remove_file(&local_tmp);
}
