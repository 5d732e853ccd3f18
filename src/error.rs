use thiserror::Error;

/// Every failure kind the engine can raise, from argument parsing through
/// extraction. `main` matches on this only to choose the printed line and
/// the exit code (always 1); library code never exits the process itself.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid target \"{0}\": expected user@host:port")]
    InvalidTarget(String),

    #[error("invalid mode \"{0}\": expected push or pull")]
    InvalidMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not establish SSH control channel to {0}: {1}")]
    ControlChannelUnavailable(String, String),

    #[error("remote command failed (exit {exit_code}): {cmd}")]
    RemoteCommandFailed { cmd: String, exit_code: i32 },

    #[error("chunk {index} failed verification (length or SHA-256 mismatch)")]
    HashMismatch { index: usize },

    #[error("partial file size {size} is not chunk-aligned or exceeds archive size {total}; refusing to resume")]
    CorruptResume { size: u64, total: u64 },

    #[error("chunk {0} failed after exhausting all retries")]
    ChunkFailed(usize),

    #[error("expected {expected} remote hashes, got {got}")]
    RemoteHashCountMismatch { expected: usize, got: usize },

    #[error("remote hash \"{0}\" is not valid hex-encoded SHA-256")]
    InvalidRemoteHash(String),

    #[error("archive is corrupted: {0}")]
    ArchiveCorrupted(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
