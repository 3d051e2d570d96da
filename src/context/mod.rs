//! Context module for the ring diagnostic.
//!
//! Rank, group size and host identity are carried in a [`WorkerContext`] value handed to
//! each phase, rather than read from runtime-global state inside the phases.

pub mod worker_context;
pub use worker_context::{ROOT, WorkerContext};
