//! Diagnostic report assembled on rank 0.

use std::fmt;

use bitflags::bitflags;

use crate::config::ExitPolicy;
use crate::diag::collective::{BroadcastOutcome, ReduceOutcome};
use crate::diag::ring::RingOutcome;
use crate::diag::tally::NodeTally;

bitflags! {
    /// Set of verification checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Checks: u8 {
        const RING = 1 << 0;
        const BROADCAST = 1 << 1;
        const REDUCE = 1 << 2;
        /// Some host names were truncated to the record width, so distinct hosts may
        /// share a bucket.
        const TALLY = 1 << 3;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagReport {
    pub size: usize,
    pub ring: RingOutcome,
    pub broadcast: BroadcastOutcome,
    pub reduce: ReduceOutcome,
    pub tally: NodeTally,
}

impl DiagReport {
    /// Checks that did not pass.
    pub fn failed(&self) -> Checks {
        let mut failed = Checks::empty();
        failed.set(Checks::RING, !self.ring.passed);
        failed.set(Checks::BROADCAST, !self.broadcast.passed);
        failed.set(Checks::REDUCE, !self.reduce.passed);
        failed.set(Checks::TALLY, !self.tally.truncated.is_empty());
        failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed().is_empty()
    }

    pub fn exit_code(&self, policy: ExitPolicy) -> u8 {
        policy.exit_code(self.all_passed())
    }
}

fn mark(passed: bool) -> &'static str {
    if passed { "✓" } else { "✗" }
}

impl fmt::Display for DiagReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Ring Diagnostic Report ({} workers) ===", self.size)?;

        let ring = &self.ring;
        if ring.passed {
            writeln!(
                f,
                "{} Ring: token {} passed through all {} workers",
                mark(true),
                ring.observed,
                self.size
            )?;
        } else {
            writeln!(
                f,
                "{} Ring: token value incorrect, expected {}, got {}",
                mark(false),
                ring.expected,
                ring.observed
            )?;
        }

        let bcast = &self.broadcast;
        if bcast.passed {
            writeln!(
                f,
                "{} Broadcast: every rank received {}",
                mark(true),
                bcast.sent
            )?;
        } else {
            writeln!(
                f,
                "{} Broadcast: ranks {:?} did not receive {}",
                mark(false),
                bcast.mismatched_ranks(),
                bcast.sent
            )?;
        }

        writeln!(
            f,
            "{} Reduce: sum {} (expected {})",
            mark(self.reduce.passed),
            self.reduce.observed,
            self.reduce.expected
        )?;

        writeln!(f)?;
        writeln!(f, "=== Node Distribution ===")?;
        write!(f, "{}", self.tally)?;
        if self.failed().contains(Checks::TALLY) {
            writeln!(
                f,
                "{} Tally: host names of ranks {:?} were truncated, raise --host-len",
                mark(false),
                self.tally.truncated
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::tally::tally_hosts;

    fn passing_report() -> DiagReport {
        DiagReport {
            size: 4,
            ring: RingOutcome {
                expected: 45,
                observed: 45,
                hops: 4,
                passed: true,
            },
            broadcast: BroadcastOutcome {
                sent: 12345,
                received: vec![12345; 4],
                passed: true,
            },
            reduce: ReduceOutcome {
                expected: 10,
                observed: 10,
                passed: true,
            },
            tally: tally_hosts(&["a", "a", "b", "b"]),
        }
    }

    #[test]
    fn passing_report_has_no_failures() {
        let report = passing_report();
        assert!(report.all_passed());
        assert_eq!(report.exit_code(ExitPolicy::Strict), 0);
        let text = report.to_string();
        assert!(text.contains("✓ Ring: token 45 passed through all 4 workers"));
        assert!(text.contains("✓ Reduce: sum 10 (expected 10)"));
        assert!(text.contains("  b: 2 processes"));
    }

    #[test]
    fn failures_are_flagged_not_fatal() {
        let mut report = passing_report();
        report.ring.observed = 44;
        report.ring.passed = false;
        report.reduce.observed = 9;
        report.reduce.passed = false;
        assert_eq!(report.failed(), Checks::RING | Checks::REDUCE);
        assert_eq!(report.exit_code(ExitPolicy::Lenient), 0);
        assert_eq!(report.exit_code(ExitPolicy::Strict), 2);
        let text = report.to_string();
        assert!(text.contains("✗ Ring: token value incorrect, expected 45, got 44"));
        assert!(text.contains("✗ Reduce: sum 9 (expected 10)"));
    }

    #[test]
    fn truncated_hosts_fail_the_tally() {
        let mut report = passing_report();
        report.tally.truncated = vec![1, 3];
        assert_eq!(report.failed(), Checks::TALLY);
        assert_eq!(report.exit_code(ExitPolicy::Strict), 2);
        assert!(
            report
                .to_string()
                .contains("✗ Tally: host names of ranks [1, 3] were truncated")
        );
    }

    #[test]
    fn broadcast_failure_names_ranks() {
        let mut report = passing_report();
        report.broadcast.received[2] = 0;
        report.broadcast.passed = false;
        assert!(report.to_string().contains("ranks [2] did not receive 12345"));
    }
}
