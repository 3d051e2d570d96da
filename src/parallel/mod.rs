//! Communication backends for the ring diagnostic.
//!
//! Every backend exposes the same blocking primitives through [`Comm`]: point-to-point
//! `i32` send/receive addressed by rank and tag, plus barrier, broadcast, sum-reduce and
//! gather rooted at a single rank. Faults in the underlying runtime surface as
//! [`DiagError`](crate::error::DiagError); nothing here retries.

use crate::error::{DiagError, Result};

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Host identity reported in the node tally.
    fn host(&self) -> &str;
    /// Name the runtime gives this processor. Defaults to the host identity.
    fn processor_name(&self) -> String {
        self.host().to_string()
    }
    fn send_i32(&self, value: i32, dest: usize, tag: i32) -> Result<()>;
    fn recv_i32(&self, source: usize, tag: i32) -> Result<i32>;
    fn barrier(&self) -> Result<()>;
    /// On return every rank holds the root's `value`.
    fn broadcast_i32(&self, value: &mut i32, root: usize) -> Result<()>;
    /// Sum of `local` over the group; `Some` on `root` only.
    fn reduce_sum_i64(&self, local: i64, root: usize) -> Result<Option<i64>>;
    /// One value per rank, indexed by rank; `Some` on `root` only.
    fn gather_i32(&self, local: i32, root: usize) -> Result<Option<Vec<i32>>>;
    /// Fixed-width records concatenated in rank order; `Some` on `root` only.
    /// Every rank must pass a record of the same length.
    fn gather_bytes(&self, local: &[u8], root: usize) -> Result<Option<Vec<u8>>>;
    /// Tear down the whole group after a fatal fault. Backends without a
    /// group-wide abort rely on their peers observing the disconnect.
    fn abort(&self, _code: i32) {}

    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank < self.size() {
            Ok(())
        } else {
            Err(DiagError::InvalidRank {
                rank,
                size: self.size(),
            })
        }
    }
}

/// Best-effort host name of the machine running this process.
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub mod local_comm;
pub use local_comm::LocalComm;
#[cfg(feature = "rayon")]
pub use local_comm::run_group;

pub enum UniverseComm {
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
    Local(LocalComm),
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            UniverseComm::Local(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            UniverseComm::Local(comm) => comm.size(),
        }
    }
    fn host(&self) -> &str {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.host(),
            UniverseComm::Local(comm) => comm.host(),
        }
    }
    fn processor_name(&self) -> String {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.processor_name(),
            UniverseComm::Local(comm) => comm.processor_name(),
        }
    }
    fn send_i32(&self, value: i32, dest: usize, tag: i32) -> Result<()> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.send_i32(value, dest, tag),
            UniverseComm::Local(comm) => comm.send_i32(value, dest, tag),
        }
    }
    fn recv_i32(&self, source: usize, tag: i32) -> Result<i32> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.recv_i32(source, tag),
            UniverseComm::Local(comm) => comm.recv_i32(source, tag),
        }
    }
    fn barrier(&self) -> Result<()> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            UniverseComm::Local(comm) => comm.barrier(),
        }
    }
    fn broadcast_i32(&self, value: &mut i32, root: usize) -> Result<()> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.broadcast_i32(value, root),
            UniverseComm::Local(comm) => comm.broadcast_i32(value, root),
        }
    }
    fn reduce_sum_i64(&self, local: i64, root: usize) -> Result<Option<i64>> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.reduce_sum_i64(local, root),
            UniverseComm::Local(comm) => comm.reduce_sum_i64(local, root),
        }
    }
    fn gather_i32(&self, local: i32, root: usize) -> Result<Option<Vec<i32>>> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.gather_i32(local, root),
            UniverseComm::Local(comm) => comm.gather_i32(local, root),
        }
    }
    fn gather_bytes(&self, local: &[u8], root: usize) -> Result<Option<Vec<u8>>> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.gather_bytes(local, root),
            UniverseComm::Local(comm) => comm.gather_bytes(local, root),
        }
    }
    fn abort(&self, code: i32) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.abort(code),
            UniverseComm::Local(comm) => comm.abort(code),
        }
    }
}
