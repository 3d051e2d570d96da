//! MPI-based communication backend.
//!
//! This module implements the `Comm` trait on top of the `mpi` crate (rsmpi) for runs where
//! every rank is its own OS process, started by `mpirun`, `mpiexec` or `srun`. The launcher
//! supplies rank and group size; this backend only reads them back from `MPI_COMM_WORLD`.
//!
//! The MPI runtime's default error handler aborts the job on a failed call, so the methods
//! here only return errors for conditions detected before the call is made, such as an
//! out-of-range rank.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # fn main() -> Result<(), ringdiag::error::DiagError> {
//! use ringdiag::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new()?;
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "mpi"))]
//! # fn main() {}
//! ```

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use crate::error::{DiagError, Result};

/// MPI communicator wrapper.
///
/// Holds the world communicator together with the universe that keeps MPI initialized.
/// Dropping the `MpiComm` finalizes MPI.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    host: String,
    processor: String,
    // Declared last so the world handle is released before finalization.
    _universe: Universe,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// Fails with [`DiagError::MpiInit`] when MPI was already initialized in this process.
    pub fn new() -> Result<Self> {
        let universe = mpi::initialize().ok_or(DiagError::MpiInit)?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        let host = super::local_hostname();
        let processor = mpi::environment::processor_name().unwrap_or_else(|_| host.clone());
        Ok(MpiComm {
            world,
            rank,
            size,
            host,
            processor,
            _universe: universe,
        })
    }
}

impl super::Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn host(&self) -> &str {
        &self.host
    }
    fn processor_name(&self) -> String {
        self.processor.clone()
    }

    fn send_i32(&self, value: i32, dest: usize, tag: i32) -> Result<()> {
        self.check_rank(dest)?;
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(&value, tag);
        Ok(())
    }

    fn recv_i32(&self, source: usize, tag: i32) -> Result<i32> {
        self.check_rank(source)?;
        let (value, _status) = self
            .world
            .process_at_rank(source as i32)
            .receive_with_tag::<i32>(tag);
        Ok(value)
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn broadcast_i32(&self, value: &mut i32, root: usize) -> Result<()> {
        self.check_rank(root)?;
        self.world.process_at_rank(root as i32).broadcast_into(value);
        Ok(())
    }

    fn reduce_sum_i64(&self, local: i64, root: usize) -> Result<Option<i64>> {
        self.check_rank(root)?;
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            let mut sum = 0i64;
            root_process.reduce_into_root(&local, &mut sum, SystemOperation::sum());
            Ok(Some(sum))
        } else {
            root_process.reduce_into(&local, SystemOperation::sum());
            Ok(None)
        }
    }

    fn gather_i32(&self, local: i32, root: usize) -> Result<Option<Vec<i32>>> {
        self.check_rank(root)?;
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            let mut recvbuf = vec![0i32; self.size];
            root_process.gather_into_root(&local, &mut recvbuf[..]);
            Ok(Some(recvbuf))
        } else {
            root_process.gather_into(&local);
            Ok(None)
        }
    }

    fn gather_bytes(&self, local: &[u8], root: usize) -> Result<Option<Vec<u8>>> {
        self.check_rank(root)?;
        let root_process = self.world.process_at_rank(root as i32);
        // Only the root allocates the receive buffer, sized from the runtime group size.
        if self.rank == root {
            let mut recvbuf = vec![0u8; local.len() * self.size];
            root_process.gather_into_root(local, &mut recvbuf[..]);
            Ok(Some(recvbuf))
        } else {
            root_process.gather_into(local);
            Ok(None)
        }
    }

    fn abort(&self, code: i32) {
        self.world.abort(code)
    }
}
