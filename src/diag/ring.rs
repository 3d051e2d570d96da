//! Token ring pass.
//!
//! Rank 0 puts `T0` on the ring and sends it right. Every other rank receives from its
//! left neighbour, adds one and sends right, so the token comes back to rank 0 after
//! `N - 1` increments. A single-worker ring has no distinct neighbour: rank 0 makes no
//! hop and the token it "receives" is `T0` itself, which is also the expected value.

use tracing::{info, warn};

use crate::context::WorkerContext;
use crate::error::Result;
use crate::parallel::Comm;

/// Result of the ring pass as seen by rank 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingOutcome {
    pub expected: i32,
    pub observed: i32,
    /// Point-to-point hops the token took; `size` for a real ring, 0 for a singleton.
    pub hops: usize,
    pub passed: bool,
}

/// Token value rank 0 must see after one full loop.
pub fn expected_token(start: i32, size: usize) -> i32 {
    start.wrapping_add(size.saturating_sub(1) as i32)
}

/// Run one loop of the ring. Returns `Some` on rank 0 only.
pub fn ring_pass<C: Comm + ?Sized>(
    comm: &C,
    ctx: &WorkerContext,
    start: i32,
    tag: i32,
) -> Result<Option<RingOutcome>> {
    if !ctx.is_root() {
        let prev = ctx.prev();
        let token = comm.recv_i32(prev, tag)?;
        info!(rank = ctx.rank, token, from = prev, "received token");
        let token = token.wrapping_add(1);
        let next = ctx.next();
        info!(rank = ctx.rank, token, to = next, "sending token");
        comm.send_i32(token, next, tag)?;
        return Ok(None);
    }

    let expected = expected_token(start, ctx.size);
    let (observed, hops) = if ctx.size == 1 {
        info!(rank = ctx.rank, token = start, "singleton ring, no hop");
        (start, 0)
    } else {
        info!(rank = ctx.rank, token = start, to = ctx.next(), "sending token");
        comm.send_i32(start, ctx.next(), tag)?;
        let last = ctx.prev();
        let token = comm.recv_i32(last, tag)?;
        info!(rank = ctx.rank, token, from = last, "received token, ring complete");
        (token, ctx.size)
    };

    let passed = observed == expected;
    if passed {
        info!(workers = ctx.size, token = observed, "token passed through every worker");
    } else {
        warn!(expected, observed, "token value incorrect");
    }
    Ok(Some(RingOutcome {
        expected,
        observed,
        hops,
        passed,
    }))
}
