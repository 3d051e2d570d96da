use thiserror::Error;

// Unified error type for ringdiag.
//
// Only messaging-runtime faults and bad configuration live here. A check that
// computes the wrong value is reported through `diag::report`, never as an error.

#[derive(Error, Debug)]
pub enum DiagError {
    #[error("MPI initialization failed (already initialized or runtime unavailable)")]
    MpiInit,
    #[error("peer rank {peer} disconnected")]
    Disconnected { peer: usize },
    #[error("invalid rank {rank} for group of size {size}")]
    InvalidRank { rank: usize, size: usize },
    #[error("invalid group size: {0}")]
    InvalidGroupSize(usize),
    #[error("payload size mismatch: expected {expected} bytes, got {got}")]
    PayloadSize { expected: usize, got: usize },
    #[error("tag {0} is reserved for collective operations")]
    ReservedTag(i32),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("worker failed: {0}")]
    Worker(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, DiagError>;
