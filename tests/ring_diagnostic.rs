//! End-to-end runs of the ring diagnostic over the in-process backend.
//!
//! Each test spins up a group of worker threads with simulated host identities and runs
//! the full phase sequence. The results are checked against the closed-form expectations:
//! the token returns as `T0 + N - 1`, the reduce sum is `N(N+1)/2`, every broadcast copy
//! matches, and the tally accounts for every rank exactly once.
#![cfg(feature = "rayon")]

use rand::Rng;
use ringdiag::config::{DiagOptions, ExitPolicy};
use ringdiag::diag::run_diagnostic;
use ringdiag::error::{DiagError, Result};
use ringdiag::parallel::{Comm, LocalComm, UniverseComm, run_group};
use ringdiag::utils::{Checks, DiagReport};

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}

fn root_report(hosts: Vec<String>, opts: &DiagOptions) -> DiagReport {
    let mut reports = run_group(hosts, |comm| run_diagnostic(&comm, opts)).unwrap();
    assert!(reports[1..].iter().all(Option::is_none), "only rank 0 reports");
    reports.swap_remove(0).expect("rank 0 report")
}

/// Four workers, T0 = 42: the token comes back as 45 and the sum is 10.
#[test]
fn four_worker_reference_scenario() {
    let report = root_report(hosts(&["a", "a", "b", "b"]), &DiagOptions::default());
    assert_eq!(report.ring.observed, 45);
    assert_eq!(report.reduce.observed, 10);
    assert_eq!(report.broadcast.received, vec![12345; 4]);
    assert!(report.all_passed());
    assert_eq!(report.exit_code(ExitPolicy::Strict), 0);
}

/// Three workers on hosts a, b, a tally as [(a, 2), (b, 1)].
#[test]
fn three_worker_tally_keeps_first_seen_order() {
    let report = root_report(hosts(&["a", "b", "a"]), &DiagOptions::default());
    assert_eq!(
        report.tally.nodes,
        vec![("a".to_string(), 2), ("b".to_string(), 1)]
    );
}

/// A group of one completes without deadlock and passes every check.
#[test]
fn singleton_group() {
    let report = root_report(hosts(&["solo"]), &DiagOptions::default());
    assert_eq!(report.ring.hops, 0);
    assert_eq!(report.ring.observed, report.ring.expected);
    assert_eq!(report.reduce.observed, 1);
    assert!(report.all_passed());
}

/// Properties hold across randomized group sizes, constants and host layouts.
#[test]
fn randomized_groups() {
    let mut rng = rand::thread_rng();
    for _ in 0..8 {
        let n: usize = rng.gen_range(1..12);
        let layout: Vec<String> = (0..n)
            .map(|_| format!("node{}", rng.gen_range(0..3)))
            .collect();
        let opts = DiagOptions {
            token_start: rng.gen_range(-1000..1000),
            broadcast_value: rng.r#gen(),
            tag: rng.gen_range(0..100),
            host_len: rng.gen_range(8..64),
            ..DiagOptions::default()
        };
        let report = root_report(layout.clone(), &opts);

        assert_eq!(report.ring.observed, opts.token_start + n as i32 - 1);
        assert_eq!(report.reduce.observed, (n * (n + 1) / 2) as i64);
        assert!(report.broadcast.received.iter().all(|&v| v == opts.broadcast_value));
        assert_eq!(report.tally.total(), n);
        for host in &layout {
            assert_eq!(report.tally.nodes.iter().filter(|(h, _)| h == host).count(), 1);
        }
        assert!(report.all_passed());
    }
}

/// Distinct hosts that collapse under a narrow record width fail the tally check
/// instead of passing as one node.
#[test]
fn narrow_host_records_fail_the_tally() {
    let opts = DiagOptions {
        host_len: 8,
        exit_policy: ExitPolicy::Strict,
        ..DiagOptions::default()
    };
    let report = root_report(hosts(&["compute-01", "compute-02"]), &opts);
    assert_eq!(report.tally.nodes, vec![("compute-".to_string(), 2)]);
    assert_eq!(report.tally.truncated, vec![0, 1]);
    assert_eq!(report.failed(), Checks::TALLY);
    assert!(!report.all_passed());
    assert_eq!(report.exit_code(opts.exit_policy), 2);
}

/// A name that fills the record exactly is not a truncation.
#[test]
fn host_name_filling_the_record_passes() {
    let opts = DiagOptions {
        host_len: 10,
        ..DiagOptions::default()
    };
    let report = root_report(hosts(&["compute-01", "compute-02"]), &opts);
    assert_eq!(report.tally.distinct(), 2);
    assert!(report.tally.truncated.is_empty());
    assert!(report.all_passed());
}

/// The run goes through the `UniverseComm` dispatch the binary uses.
#[test]
fn universe_dispatch_matches_direct_backend() {
    let opts = DiagOptions::default();
    let reports = run_group(hosts(&["x", "y"]), |comm| {
        run_diagnostic(&UniverseComm::Local(comm), &opts)
    })
    .unwrap();
    let report = reports[0].as_ref().unwrap();
    assert_eq!(report.ring.observed, 43);
    assert_eq!(report.reduce.observed, 3);
}

/// A communicator whose reduce result is off by one, to exercise a logical failure.
struct SkewedReduce(LocalComm);

impl Comm for SkewedReduce {
    fn rank(&self) -> usize {
        self.0.rank()
    }
    fn size(&self) -> usize {
        self.0.size()
    }
    fn host(&self) -> &str {
        self.0.host()
    }
    fn send_i32(&self, value: i32, dest: usize, tag: i32) -> Result<()> {
        self.0.send_i32(value, dest, tag)
    }
    fn recv_i32(&self, source: usize, tag: i32) -> Result<i32> {
        self.0.recv_i32(source, tag)
    }
    fn barrier(&self) -> Result<()> {
        self.0.barrier()
    }
    fn broadcast_i32(&self, value: &mut i32, root: usize) -> Result<()> {
        self.0.broadcast_i32(value, root)
    }
    fn reduce_sum_i64(&self, local: i64, root: usize) -> Result<Option<i64>> {
        Ok(self.0.reduce_sum_i64(local, root)?.map(|sum| sum + 1))
    }
    fn gather_i32(&self, local: i32, root: usize) -> Result<Option<Vec<i32>>> {
        self.0.gather_i32(local, root)
    }
    fn gather_bytes(&self, local: &[u8], root: usize) -> Result<Option<Vec<u8>>> {
        self.0.gather_bytes(local, root)
    }
}

/// A failed check is reported and the run still reaches the tally phase.
#[test]
fn verification_failure_is_not_fatal() {
    let opts = DiagOptions::default();
    let reports = run_group(hosts(&["a", "b", "c"]), |comm| {
        run_diagnostic(&SkewedReduce(comm), &opts)
    })
    .unwrap();
    let report = reports[0].as_ref().unwrap();
    assert_eq!(report.failed(), Checks::REDUCE);
    assert_eq!(report.reduce.observed, 7);
    assert_eq!(report.tally.total(), 3);
    assert_eq!(report.exit_code(ExitPolicy::Lenient), 0);
    assert_eq!(report.exit_code(ExitPolicy::Strict), 2);
}

/// A worker that dies mid-run surfaces as an error instead of hanging the group.
#[test]
fn messaging_fault_is_fatal() {
    let opts = DiagOptions::default();
    let err = run_group(hosts(&["a", "b", "c", "d"]), |comm| {
        if comm.rank() == 2 {
            return Err(DiagError::Worker("rank 2 crashed".into()));
        }
        run_diagnostic(&comm, &opts)
    })
    .unwrap_err();
    assert!(matches!(err, DiagError::Worker(msg) if msg.contains("rank 2")));
}
