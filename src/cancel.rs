use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A single cancellation token shared by the producer, every worker, and the
/// control channel. Triggering it (a) stops further chunk indices from being
/// enqueued, (b) kills any in-flight `ssh` child processes so blocking reads
/// and writes return promptly, and (c) is observed by workers at their next
/// suspension point.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    children: Mutex<Vec<u32>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Mark the token cancelled and kill every currently-registered child
    /// process so it unblocks whatever I/O it's doing.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let pids = self.inner.children.lock().unwrap();
        for pid in pids.iter() {
            let _ = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status();
        }
    }

    /// Register a spawned child's pid for the duration of the returned
    /// guard. If the token is already cancelled, the child is killed
    /// immediately.
    pub fn track(&self, pid: u32) -> ChildGuard {
        {
            let mut pids = self.inner.children.lock().unwrap();
            pids.push(pid);
        }
        if self.is_cancelled() {
            let _ = Command::new("kill").arg("-TERM").arg(pid.to_string()).status();
        }
        ChildGuard {
            token: self.clone(),
            pid,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters a tracked pid when the command it belongs to has finished.
pub struct ChildGuard {
    token: CancellationToken,
    pid: u32,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let mut pids = self.token.inner.children.lock().unwrap();
        pids.retain(|&p| p != self.pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let tok = CancellationToken::new();
        assert!(!tok.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_by_clones() {
        let tok = CancellationToken::new();
        let clone = tok.clone();
        tok.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn guard_deregisters_on_drop() {
        let tok = CancellationToken::new();
        {
            let _guard = tok.track(999_999);
            assert_eq!(tok.inner.children.lock().unwrap().len(), 1);
        }
        assert_eq!(tok.inner.children.lock().unwrap().len(), 0);
    }
}
