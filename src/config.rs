/// Default chunk size: 4 MiB. This is wire-visible — changing it invalidates
/// any partial staging file already on disk.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

pub const DEFAULT_MAX_RETRY: u32 = 3;

pub const DEFAULT_WORKERS: usize = 3;

pub const DEFAULT_CONTROL_PERSIST_SECS: u32 = 600;

/// Run configuration for a single transfer. Defaults come from the
/// constants above; the CLI may override any of them for one invocation.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub chunk_size: u64,
    pub max_retry: u32,
    pub workers: usize,
    pub control_persist_secs: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retry: DEFAULT_MAX_RETRY,
            workers: DEFAULT_WORKERS,
            control_persist_secs: DEFAULT_CONTROL_PERSIST_SECS,
        }
    }
}
