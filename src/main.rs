//! ringdiag - message-passing ring diagnostic
//!
//! Entry point for the CLI application.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ringdiag::config::{Backend, CliArgs, RunConfig};
use ringdiag::diag::run_diagnostic;
use ringdiag::utils::DiagReport;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8> {
    let args = CliArgs::parse();

    setup_logging(args.verbose, args.quiet);

    let config = RunConfig::from_args(&args).context("Invalid configuration")?;

    let report = match config.backend {
        Backend::Local => run_local(&config)?,
        Backend::Mpi => run_mpi(&config)?,
    };

    // Only rank 0 holds a report; every other rank exits cleanly.
    match report {
        Some(report) => {
            println!("\n{report}");
            Ok(report.exit_code(config.options.exit_policy))
        }
        None => Ok(0),
    }
}

#[cfg(feature = "rayon")]
fn run_local(config: &RunConfig) -> Result<Option<DiagReport>> {
    use ringdiag::parallel::{UniverseComm, run_group};

    let reports = run_group(config.hosts.clone(), |comm| {
        run_diagnostic(&UniverseComm::Local(comm), &config.options)
    })
    .context("Local diagnostic run failed")?;
    Ok(reports.into_iter().flatten().next())
}

#[cfg(not(feature = "rayon"))]
fn run_local(config: &RunConfig) -> Result<Option<DiagReport>> {
    use ringdiag::parallel::{LocalComm, UniverseComm};

    // Without a thread pool only a single-worker group can run, inline.
    if config.hosts.len() != 1 {
        anyhow::bail!(
            "a local group of {} workers requires the `rayon` feature",
            config.hosts.len()
        );
    }
    let comm = LocalComm::group(config.hosts.clone())?
        .pop()
        .context("Empty local group")?;
    Ok(run_diagnostic(&UniverseComm::Local(comm), &config.options)?)
}

#[cfg(feature = "mpi")]
fn run_mpi(config: &RunConfig) -> Result<Option<DiagReport>> {
    use ringdiag::parallel::{Comm, MpiComm, UniverseComm};

    let comm = UniverseComm::Mpi(MpiComm::new().context("Failed to initialize MPI")?);
    match run_diagnostic(&comm, &config.options) {
        Ok(report) => Ok(report),
        Err(e) => {
            // A partial group can never satisfy the remaining barriers.
            error!(rank = comm.rank(), "fatal messaging fault: {e}");
            comm.abort(1);
            Err(e).context("MPI diagnostic run failed")
        }
    }
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_config: &RunConfig) -> Result<Option<DiagReport>> {
    Err(ringdiag::error::DiagError::Unsupported(
        "MPI backend requires building with the `mpi` feature",
    ))
    .context("Invalid configuration")
}

fn setup_logging(verbose: bool, quiet: bool) {
    let default = if quiet {
        "ringdiag=warn,warn"
    } else if verbose {
        "ringdiag=debug,warn"
    } else {
        "ringdiag=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
