//! Node distribution tally.
//!
//! Each rank encodes its host identity as a fixed-width record and gathers it to rank 0.
//! The gather buffer is `size * host_len` bytes, allocated for the group size known at
//! runtime. Rank 0 splits it back into one string per rank and counts ranks per distinct
//! host, keeping hosts in the order they first appear.
//!
//! A name longer than the record is cut short, which can merge distinct hosts. Every rank
//! also gathers the full byte length of its name, so rank 0 knows exactly which records
//! were truncated and reports them as a failed tally.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::context::{ROOT, WorkerContext};
use crate::error::{DiagError, Result};
use crate::parallel::Comm;

/// Ranks per distinct host, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeTally {
    pub nodes: Vec<(String, usize)>,
    /// Ranks whose host name did not fit the record width.
    pub truncated: Vec<usize>,
}

impl NodeTally {
    /// Number of distinct hosts.
    pub fn distinct(&self) -> usize {
        self.nodes.len()
    }

    /// Number of ranks counted; equals the group size for a complete report.
    pub fn total(&self) -> usize {
        self.nodes.iter().map(|(_, count)| count).sum()
    }

    pub fn count(&self, host: &str) -> Option<usize> {
        self.nodes
            .iter()
            .find(|(h, _)| h == host)
            .map(|&(_, count)| count)
    }
}

impl fmt::Display for NodeTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processes distributed across {} node(s):", self.distinct())?;
        for (host, count) in &self.nodes {
            writeln!(f, "  {host}: {count} processes")?;
        }
        Ok(())
    }
}

/// Deduplicate host identities by exact equality, keeping first-seen order.
pub fn tally_hosts<S: AsRef<str>>(hosts: &[S]) -> NodeTally {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(hosts.len());
    let mut nodes: Vec<(String, usize)> = Vec::new();
    for host in hosts {
        let host = host.as_ref();
        match index.get(host) {
            Some(&slot) => nodes[slot].1 += 1,
            None => {
                index.insert(host, nodes.len());
                nodes.push((host.to_string(), 1));
            }
        }
    }
    NodeTally {
        nodes,
        truncated: Vec::new(),
    }
}

/// Whether `host` fits a record of `width` bytes without truncation.
pub fn fits_record(host: &str, width: usize) -> bool {
    host.len() <= width
}

/// Encode `host` into a NUL-padded record of exactly `width` bytes.
///
/// Names longer than the record are cut at the last character boundary that fits.
pub fn encode_host_record(host: &str, width: usize) -> Vec<u8> {
    let mut end = host.len().min(width);
    while !host.is_char_boundary(end) {
        end -= 1;
    }
    let mut record = vec![0u8; width];
    record[..end].copy_from_slice(&host.as_bytes()[..end]);
    record
}

/// Split a gather buffer into one host string per rank.
pub fn decode_host_records(buf: &[u8], width: usize, size: usize) -> Result<Vec<String>> {
    if width == 0 || buf.len() != width * size {
        return Err(DiagError::PayloadSize {
            expected: width * size,
            got: buf.len(),
        });
    }
    Ok(buf
        .chunks_exact(width)
        .map(|record| {
            let end = record.iter().position(|&b| b == 0).unwrap_or(record.len());
            String::from_utf8_lossy(&record[..end]).into_owned()
        })
        .collect())
}

/// Gather host identities to rank 0 and tally them. Returns `Some` on rank 0 only.
pub fn node_tally<C: Comm + ?Sized>(
    comm: &C,
    ctx: &WorkerContext,
    host_len: usize,
) -> Result<Option<NodeTally>> {
    if !fits_record(&ctx.host, host_len) {
        warn!(
            rank = ctx.rank,
            host = %ctx.host,
            host_len,
            "host name does not fit its record, truncating"
        );
    }
    let full_len = i32::try_from(ctx.host.len()).unwrap_or(i32::MAX);
    let lengths = comm.gather_i32(full_len, ROOT)?;
    let record = encode_host_record(&ctx.host, host_len);
    let buf = comm.gather_bytes(&record, ROOT)?;
    let (Some(lengths), Some(buf)) = (lengths, buf) else {
        return Ok(None);
    };
    let hosts = decode_host_records(&buf, host_len, ctx.size)?;
    debug!(?hosts, "gathered host identities");
    let mut tally = tally_hosts(&hosts);
    tally.truncated = lengths
        .iter()
        .enumerate()
        .filter(|&(_, &len)| usize::try_from(len).is_ok_and(|len| len > host_len))
        .map(|(rank, _)| rank)
        .collect();
    info!(
        nodes = tally.distinct(),
        workers = tally.total(),
        "node distribution"
    );
    for (host, count) in &tally.nodes {
        info!(host = %host, processes = count, "node");
    }
    if !tally.truncated.is_empty() {
        warn!(
            ranks = ?tally.truncated,
            host_len,
            "host names were truncated, tally may merge distinct hosts"
        );
    }
    Ok(Some(tally))
}
