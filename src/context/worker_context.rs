//! Per-worker identity threaded through every phase.

use crate::parallel::Comm;

/// Rank 0 drives the ring and owns every aggregate.
pub const ROOT: usize = 0;

/// Identity of one worker for the lifetime of a run.
///
/// Built once from the communicator and passed explicitly to every phase function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    /// This worker's rank, in `[0, size)`
    pub rank: usize,
    /// Group size `N`
    pub size: usize,
    /// Host identity reported in the node tally
    pub host: String,
    /// Processor name reported by the messaging runtime
    pub processor: String,
    /// OS process id
    pub pid: u32,
}

impl WorkerContext {
    pub fn from_comm<C: Comm + ?Sized>(comm: &C) -> Self {
        WorkerContext {
            rank: comm.rank(),
            size: comm.size(),
            host: comm.host().to_string(),
            processor: comm.processor_name(),
            pid: std::process::id(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    /// Right-hand neighbour on the ring.
    pub fn next(&self) -> usize {
        (self.rank + 1) % self.size
    }

    /// Left-hand neighbour on the ring.
    pub fn prev(&self) -> usize {
        (self.rank + self.size - 1) % self.size
    }
}
