//! Command-line arguments for the `ringdiag` binary.
//!
//! [`CliArgs`] is parsed with clap derive macros. [`RunConfig::from_args`] validates it
//! into the backend choice, the local group layout and the [`DiagOptions`] shared by every
//! worker.

use clap::{Parser, ValueEnum};

use super::options::{
    DEFAULT_BROADCAST_VALUE, DEFAULT_HOST_LEN, DEFAULT_TOKEN, DiagOptions, ExitPolicy,
};
use crate::error::{DiagError, Result};
use crate::parallel::local_hostname;

/// Maximum in-process group size (one thread per worker).
pub const MAX_LOCAL_WORKERS: usize = 1024;

/// Communication backend.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process group, one thread per worker
    Local,
    /// One process per rank under an MPI launcher
    Mpi,
}

/// Message-passing ring diagnostic
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ringdiag",
    version,
    about = "Message-passing ring diagnostic",
    long_about = "Passes a token around a ring of workers, then checks broadcast and sum-reduce \
                  results and tallies how the workers are spread across hosts.",
    after_help = "EXAMPLES:\n    \
        ringdiag -n 4\n    \
        ringdiag --hosts a,b,a --strict\n    \
        mpirun -np 8 ringdiag --backend mpi"
)]
pub struct CliArgs {
    /// Communication backend
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    pub backend: Backend,

    /// Number of in-process workers (local backend)
    #[arg(short = 'n', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Simulated host identity per local worker, indexed by rank
    #[arg(long, value_delimiter = ',', value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Token value rank 0 starts the ring with
    #[arg(long, default_value_t = DEFAULT_TOKEN, allow_negative_numbers = true, value_name = "T0")]
    pub token: i32,

    /// Value rank 0 broadcasts
    #[arg(long, default_value_t = DEFAULT_BROADCAST_VALUE, allow_negative_numbers = true)]
    pub broadcast_value: i32,

    /// Tag for ring messages
    #[arg(long, default_value_t = 0)]
    pub tag: i32,

    /// Bytes per host record in the node tally
    #[arg(long, default_value_t = DEFAULT_HOST_LEN, value_name = "BYTES")]
    pub host_len: usize,

    /// Exit with status 2 when any check fails
    #[arg(long)]
    pub strict: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub backend: Backend,
    /// Host identity per local worker; empty for MPI, where the launcher decides.
    pub hosts: Vec<String>,
    pub options: DiagOptions,
}

impl RunConfig {
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let options = DiagOptions {
            token_start: args.token,
            broadcast_value: args.broadcast_value,
            tag: args.tag,
            host_len: args.host_len,
            exit_policy: if args.strict {
                ExitPolicy::Strict
            } else {
                ExitPolicy::Lenient
            },
        };
        options.validate()?;

        let hosts = match args.backend {
            Backend::Local => local_hosts(args.workers, &args.hosts)?,
            Backend::Mpi => {
                if !cfg!(feature = "mpi") {
                    return Err(DiagError::Unsupported(
                        "MPI backend requires building with the `mpi` feature",
                    ));
                }
                if args.workers.is_some() || !args.hosts.is_empty() {
                    return Err(DiagError::Config(
                        "--workers and --hosts apply to the local backend; \
                         the MPI launcher sets group size and placement"
                            .to_string(),
                    ));
                }
                Vec::new()
            }
        };

        Ok(RunConfig {
            backend: args.backend,
            hosts,
            options,
        })
    }
}

fn local_hosts(workers: Option<usize>, hosts: &[String]) -> Result<Vec<String>> {
    let size = match (workers, hosts.len()) {
        (Some(n), given) if given > 0 && n != given => {
            return Err(DiagError::Config(format!(
                "--workers {n} disagrees with {given} entries in --hosts"
            )));
        }
        (_, given) if given > 0 => given,
        (Some(n), _) => n,
        (None, _) => default_workers(),
    };
    if size == 0 || size > MAX_LOCAL_WORKERS {
        return Err(DiagError::InvalidGroupSize(size));
    }
    if hosts.is_empty() {
        Ok(vec![local_hostname(); size])
    } else {
        Ok(hosts.to_vec())
    }
}

#[cfg(feature = "rayon")]
fn default_workers() -> usize {
    num_cpus::get().clamp(1, MAX_LOCAL_WORKERS)
}

#[cfg(not(feature = "rayon"))]
fn default_workers() -> usize {
    1
}
