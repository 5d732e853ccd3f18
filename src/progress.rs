use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Concurrently-mutated transfer counters: one atomic, writer-writer
/// commutative byte counter plus the wall-clock start time used to derive
/// throughput.
pub struct TransferStats {
    transferred: AtomicU64,
    start: Instant,
}

impl TransferStats {
    pub fn new(seed_bytes: u64) -> Arc<Self> {
        Arc::new(TransferStats {
            transferred: AtomicU64::new(seed_bytes),
            start: Instant::now(),
        })
    }

    pub fn add(&self, n: u64) {
        self.transferred.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }
}

/// Drives an `indicatif` bar off the atomic counter until stopped. Reads
/// the counter only — it never blocks a worker and is allowed to overcount
/// briefly when a retry replays a chunk.
pub struct ProgressPrinter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPrinter {
    pub fn start(stats: Arc<TransferStats>, total_bytes: u64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let bar = ProgressBar::new(total_bytes.max(1));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("📊 {bar:40.cyan/blue} {percent}% | {msg}")
                .expect("static template is valid")
                .progress_chars("##-"),
        );
        bar.set_position(stats.get().min(total_bytes));

        let handle = thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                tick(&bar, &stats, total_bytes);
                thread::sleep(Duration::from_millis(500));
            }
            tick(&bar, &stats, total_bytes);
            bar.finish_and_clear();
        });

        ProgressPrinter {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn tick(bar: &ProgressBar, stats: &TransferStats, total_bytes: u64) {
    let transferred = stats.get();
    let elapsed = stats.start.elapsed().as_secs_f64().max(0.001);
    let kbps = (transferred as f64 / 1024.0) / elapsed;
    bar.set_position(transferred.min(total_bytes.max(1)));
    bar.set_message(format!("{:.1} KB/s", kbps));
}
