//! Ring diagnostic protocol.
//!
//! Every worker runs [`run_diagnostic`] with the same [`DiagOptions`]. The phases run in a
//! fixed order and a full-group barrier separates each one from the next, so no worker
//! observes a later phase before the whole group has finished the current one:
//!
//! `Init → Announce → Ring → BroadcastReduce → Tally → Done`
//!
//! Verification results are collected on rank 0 into a [`DiagReport`]. A check that fails
//! is logged and recorded, and the run moves on. Only a messaging fault ends the run
//! early, returned as `Err`.
//!
//! # Example
//! ```no_run
//! use ringdiag::config::DiagOptions;
//! use ringdiag::diag::run_diagnostic;
//! use ringdiag::parallel::run_group;
//!
//! let hosts = vec!["a".to_string(), "b".to_string(), "a".to_string()];
//! let reports = run_group(hosts, |comm| run_diagnostic(&comm, &DiagOptions::default()))?;
//! let report = reports[0].as_ref().expect("rank 0 produces the report");
//! println!("{report}");
//! # Ok::<(), ringdiag::error::DiagError>(())
//! ```

pub mod collective;
pub mod ring;
pub mod tally;

pub use collective::{BroadcastOutcome, ReduceOutcome, broadcast_check, reduce_check};
pub use ring::{RingOutcome, ring_pass};
pub use tally::{NodeTally, node_tally, tally_hosts};

use tracing::{debug, info, info_span};

use crate::config::DiagOptions;
use crate::context::WorkerContext;
use crate::error::{DiagError, Result};
use crate::parallel::Comm;
use crate::utils::DiagReport;

/// Phases of the protocol, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Announce,
    Ring,
    BroadcastReduce,
    Tally,
    Done,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Announce => "announce",
            Phase::Ring => "ring",
            Phase::BroadcastReduce => "broadcast-reduce",
            Phase::Tally => "tally",
            Phase::Done => "done",
        }
    }
}

fn enter(ctx: &WorkerContext, phase: Phase) {
    debug!(rank = ctx.rank, phase = phase.name(), "entering phase");
}

/// Barrier that closes `phase` for the whole group.
fn close<C: Comm + ?Sized>(comm: &C, ctx: &WorkerContext, phase: Phase) -> Result<()> {
    comm.barrier()?;
    debug!(rank = ctx.rank, phase = phase.name(), "phase complete");
    Ok(())
}

/// Run all phases on this worker. Returns the report on rank 0 and `None` elsewhere.
pub fn run_diagnostic<C: Comm + ?Sized>(
    comm: &C,
    opts: &DiagOptions,
) -> Result<Option<DiagReport>> {
    opts.validate()?;
    let ctx = WorkerContext::from_comm(comm);
    let span = info_span!("ringdiag", rank = ctx.rank);
    let _guard = span.enter();
    enter(&ctx, Phase::Init);

    enter(&ctx, Phase::Announce);
    info!(
        rank = ctx.rank,
        size = ctx.size,
        host = %ctx.host,
        processor = %ctx.processor,
        pid = ctx.pid,
        "worker online"
    );
    close(comm, &ctx, Phase::Announce)?;

    enter(&ctx, Phase::Ring);
    if ctx.is_root() {
        info!(workers = ctx.size, "starting ring test");
    }
    let ring = ring_pass(comm, &ctx, opts.token_start, opts.tag)?;
    close(comm, &ctx, Phase::Ring)?;

    enter(&ctx, Phase::BroadcastReduce);
    if ctx.is_root() {
        info!("testing collective operations");
    }
    let broadcast = broadcast_check(comm, &ctx, opts.broadcast_value)?;
    comm.barrier()?;
    let reduce = reduce_check(comm, &ctx)?;
    close(comm, &ctx, Phase::BroadcastReduce)?;

    enter(&ctx, Phase::Tally);
    let tally = node_tally(comm, &ctx, opts.host_len)?;
    close(comm, &ctx, Phase::Tally)?;

    enter(&ctx, Phase::Done);
    let report = match (ring, broadcast, reduce, tally) {
        (Some(ring), Some(broadcast), Some(reduce), Some(tally)) => Some(DiagReport {
            size: ctx.size,
            ring,
            broadcast,
            reduce,
            tally,
        }),
        (None, None, None, None) => None,
        _ => {
            return Err(DiagError::Worker(format!(
                "rank {} received a partial set of root results",
                ctx.rank
            )));
        }
    };
    if let Some(report) = &report {
        if report.all_passed() {
            info!("all diagnostic checks passed");
        } else {
            info!(failed = ?report.failed(), "diagnostic completed with failed checks");
        }
    }
    Ok(report)
}

#[cfg(all(test, feature = "rayon"))]
mod tests {
    use super::*;
    use crate::parallel::run_group;

    fn run(hosts: &[&str], opts: &DiagOptions) -> Vec<Option<DiagReport>> {
        let hosts = hosts.iter().map(|h| h.to_string()).collect();
        run_group(hosts, |comm| run_diagnostic(&comm, opts)).unwrap()
    }

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::Init < Phase::Announce);
        assert!(Phase::Ring < Phase::BroadcastReduce);
        assert!(Phase::Tally < Phase::Done);
        assert_eq!(Phase::BroadcastReduce.name(), "broadcast-reduce");
    }

    #[test]
    fn only_root_reports() {
        let reports = run(&["a", "b", "a"], &DiagOptions::default());
        assert!(reports[0].is_some());
        assert!(reports[1..].iter().all(Option::is_none));
    }

    #[test]
    fn single_worker_completes() {
        let reports = run(&["solo"], &DiagOptions::default());
        let report = reports[0].as_ref().unwrap();
        assert!(report.all_passed());
        assert_eq!(report.ring.observed, 42);
        assert_eq!(report.reduce.observed, 1);
        assert_eq!(report.tally.nodes, vec![("solo".to_string(), 1)]);
    }

    #[test]
    fn invalid_options_fail_before_any_communication() {
        let opts = DiagOptions {
            host_len: 0,
            ..DiagOptions::default()
        };
        let err = run_group(vec!["a".into(), "b".into()], |comm| run_diagnostic(&comm, &opts))
            .unwrap_err();
        assert!(matches!(err, DiagError::Config(_)));
    }
}
