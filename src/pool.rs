use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::bounded;

use crate::cancel::CancellationToken;
use crate::error::{Result, StreamError};

/// Run `worker` across `workers` threads pulling chunk indices
/// `start_chunk..total_chunks` from a bounded queue of capacity `workers`.
/// The first error from any worker cancels the token so the rest stop
/// promptly; the producer stops enqueueing the moment the token is
/// cancelled, whether that cancellation came from a worker error or from
/// an external signal.
pub fn run_pool<F>(start_chunk: usize, total_chunks: usize, workers: usize, token: &CancellationToken, worker: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Send + Sync + 'static,
{
    if start_chunk >= total_chunks {
        return Ok(());
    }

    let worker_count = workers.max(1);
    let (tx, rx) = bounded::<usize>(worker_count);
    let worker = Arc::new(worker);
    let first_error: Arc<Mutex<Option<StreamError>>> = Arc::new(Mutex::new(None));

    let handles: Vec<_> = (0..worker_count)
        .map(|_| {
            let rx = rx.clone();
            let worker = Arc::clone(&worker);
            let token = token.clone();
            let first_error = Arc::clone(&first_error);
            thread::spawn(move || {
                while let Ok(index) = rx.recv() {
                    if token.is_cancelled() {
                        break;
                    }
                    if let Err(e) = worker(index) {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        drop(slot);
                        token.cancel();
                        break;
                    }
                }
            })
        })
        .collect();

    for index in start_chunk..total_chunks {
        if token.is_cancelled() {
            break;
        }
        if tx.send(index).is_err() {
            break;
        }
    }
    drop(tx);

    for handle in handles {
        let _ = handle.join();
    }

    if let Some(e) = first_error.lock().unwrap().take() {
        return Err(e);
    }
    if token.is_cancelled() {
        return Err(StreamError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_chunk_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        let seen_clone = Arc::clone(&seen);
        run_pool(0, 10, 3, &token, move |i| {
            seen_clone.lock().unwrap().push(i);
            Ok(())
        })
        .unwrap();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn resumed_range_skips_earlier_chunks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        let seen_clone = Arc::clone(&seen);
        run_pool(5, 10, 2, &token, move |i| {
            seen_clone.lock().unwrap().push(i);
            Ok(())
        })
        .unwrap();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn worker_error_aborts_and_cancels_remaining_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let calls_clone = Arc::clone(&calls);
        let err = run_pool(0, 1000, 4, &token, move |i| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            if i == 3 {
                Err(StreamError::ChunkFailed(3))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(matches!(err, StreamError::ChunkFailed(3)));
        assert!(token.is_cancelled());
        // Far fewer than 1000 chunks should have been attempted once the
        // failure fires cancellation.
        assert!(calls.load(Ordering::Relaxed) < 1000);
    }

    #[test]
    fn empty_range_is_a_no_op() {
        let token = CancellationToken::new();
        run_pool(10, 10, 3, &token, |_| Ok(())).unwrap();
    }

    #[test]
    fn pre_cancelled_token_yields_cancelled_error() {
        let token = CancellationToken::new();
        token.cancel();
        let err = run_pool(0, 10, 2, &token, |_| Ok(())).unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
    }
}
