//! ringdiag: message-passing ring diagnostic
//!
//! This crate checks that a group of message-passing workers can talk to each other. It
//! passes a token around a logical ring and verifies broadcast and sum-reduce results.
//! It then tallies how the workers are spread across hosts. The same protocol runs over
//! MPI (feature `mpi`) or over an in-process group of threads (feature `rayon`, default).

pub mod parallel;

pub mod config;
pub mod context;
pub mod diag;
pub mod error;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use diag::*;
pub use error::*;
pub use utils::*;
