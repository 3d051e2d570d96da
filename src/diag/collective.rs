//! Broadcast and sum-reduce checks.

use tracing::{info, warn};

use crate::context::{ROOT, WorkerContext};
use crate::error::Result;
use crate::parallel::Comm;

/// Broadcast check as seen by rank 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub sent: i32,
    /// The value each rank ended up with, indexed by rank.
    pub received: Vec<i32>,
    pub passed: bool,
}

impl BroadcastOutcome {
    /// Ranks whose copy differs from what rank 0 sent.
    pub fn mismatched_ranks(&self) -> Vec<usize> {
        self.received
            .iter()
            .enumerate()
            .filter(|&(_, v)| *v != self.sent)
            .map(|(rank, _)| rank)
            .collect()
    }
}

/// Sum-reduce check as seen by rank 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReduceOutcome {
    pub expected: i64,
    pub observed: i64,
    pub passed: bool,
}

/// `1 + 2 + ... + size`.
pub fn expected_sum(size: usize) -> i64 {
    let n = size as i64;
    n * (n + 1) / 2
}

/// Broadcast `value` from rank 0, then gather every rank's copy back to rank 0 to compare.
pub fn broadcast_check<C: Comm + ?Sized>(
    comm: &C,
    ctx: &WorkerContext,
    value: i32,
) -> Result<Option<BroadcastOutcome>> {
    let mut data = if ctx.is_root() {
        info!(rank = ctx.rank, value, "broadcasting value");
        value
    } else {
        0
    };
    comm.broadcast_i32(&mut data, ROOT)?;
    info!(rank = ctx.rank, value = data, "received broadcast value");

    let Some(received) = comm.gather_i32(data, ROOT)? else {
        return Ok(None);
    };
    let mut outcome = BroadcastOutcome {
        sent: value,
        received,
        passed: false,
    };
    let mismatched = outcome.mismatched_ranks();
    outcome.passed = mismatched.is_empty() && outcome.received.len() == ctx.size;
    if outcome.passed {
        info!(workers = ctx.size, value, "broadcast test passed");
    } else {
        warn!(?mismatched, value, "broadcast test failed");
    }
    Ok(Some(outcome))
}

/// Every rank contributes `rank + 1`; rank 0 compares the sum with the closed form.
pub fn reduce_check<C: Comm + ?Sized>(
    comm: &C,
    ctx: &WorkerContext,
) -> Result<Option<ReduceOutcome>> {
    let local = ctx.rank as i64 + 1;
    let Some(observed) = comm.reduce_sum_i64(local, ROOT)? else {
        return Ok(None);
    };
    let expected = expected_sum(ctx.size);
    let passed = observed == expected;
    if passed {
        info!(sum = observed, expected, "reduction test passed");
    } else {
        warn!(sum = observed, expected, "reduction test failed");
    }
    Ok(Some(ReduceOutcome {
        expected,
        observed,
        passed,
    }))
}

#[cfg(all(test, feature = "rayon"))]
mod tests {
    use super::*;
    use crate::parallel::{LocalComm, run_group};

    #[test]
    fn closed_form_sum() {
        assert_eq!(expected_sum(1), 1);
        assert_eq!(expected_sum(4), 10);
        assert_eq!(expected_sum(100), 5050);
    }

    #[test]
    fn mismatched_ranks_lists_divergent_copies() {
        let outcome = BroadcastOutcome {
            sent: 5,
            received: vec![5, 4, 5, 0],
            passed: false,
        };
        assert_eq!(outcome.mismatched_ranks(), vec![1, 3]);
    }

    #[test]
    fn broadcast_and_reduce_on_four_workers() {
        let hosts = vec!["h".to_string(); 4];
        let results = run_group(hosts, |comm: LocalComm| {
            let ctx = WorkerContext::from_comm(&comm);
            let bcast = broadcast_check(&comm, &ctx, 12345)?;
            let reduce = reduce_check(&comm, &ctx)?;
            Ok((bcast, reduce))
        })
        .unwrap();

        let (bcast, reduce) = results[0].clone();
        let bcast = bcast.unwrap();
        assert!(bcast.passed);
        assert_eq!(bcast.received, vec![12345; 4]);
        assert_eq!(
            reduce,
            Some(ReduceOutcome {
                expected: 10,
                observed: 10,
                passed: true,
            })
        );
        assert!(results[1..].iter().all(|(b, r)| b.is_none() && r.is_none()));
    }
}
