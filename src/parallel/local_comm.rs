//! In-process communication backend.
//!
//! A group of `N` [`LocalComm`] endpoints is wired together with one unbounded
//! `crossbeam_channel` per ordered (sender, receiver) pair, so delivery between a fixed pair
//! preserves send order. Receives match on source and tag. A message that arrives ahead of
//! its matching receive is parked in a per-source queue until someone asks for it.
//!
//! Collectives are linear fan-in/fan-out through the root over point-to-point messages on
//! negative tags. Those tags are rejected by the public [`Comm::send_i32`]/[`Comm::recv_i32`].
//!
//! Each endpoint owns the only senders for its outgoing channels. When a worker returns or
//! fails, its endpoint is dropped and any peer blocked on it sees
//! [`DiagError::Disconnected`] instead of hanging.

use std::cell::RefCell;
use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::Comm;
use crate::error::{DiagError, Result};

const TAG_BARRIER: i32 = -1;
const TAG_BCAST: i32 = -2;
const TAG_REDUCE: i32 = -3;
const TAG_GATHER: i32 = -4;

#[derive(Debug)]
struct Envelope {
    tag: i32,
    data: Vec<u8>,
}

/// One worker's endpoint in an in-process group.
pub struct LocalComm {
    rank: usize,
    size: usize,
    host: String,
    /// Indexed by destination rank.
    outboxes: Vec<Sender<Envelope>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Envelope>>,
    /// Messages received ahead of a matching receive, indexed by source rank.
    pending: RefCell<Vec<VecDeque<Envelope>>>,
}

impl LocalComm {
    /// Build a fully connected group, one endpoint per entry of `hosts`.
    ///
    /// `hosts[r]` becomes the host identity of rank `r`, which lets tests and single-machine
    /// runs simulate a multi-node layout.
    pub fn group(hosts: Vec<String>) -> Result<Vec<LocalComm>> {
        let size = hosts.len();
        if size == 0 {
            return Err(DiagError::InvalidGroupSize(0));
        }

        // receivers[dst][src] is the receiving half of the src -> dst channel.
        let mut outboxes: Vec<Vec<Sender<Envelope>>> = Vec::with_capacity(size);
        let mut receivers: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for src in 0..size {
            let mut row = Vec::with_capacity(size);
            for dst_inboxes in receivers.iter_mut() {
                let (tx, rx) = unbounded();
                row.push(tx);
                dst_inboxes[src] = Some(rx);
            }
            outboxes.push(row);
        }

        let comms = hosts
            .into_iter()
            .zip(outboxes)
            .zip(receivers)
            .enumerate()
            .map(|(rank, ((host, outboxes), inboxes))| LocalComm {
                rank,
                size,
                host,
                outboxes,
                inboxes: inboxes.into_iter().flatten().collect(),
                pending: RefCell::new((0..size).map(|_| VecDeque::new()).collect()),
            })
            .collect();
        Ok(comms)
    }

    fn post(&self, dest: usize, tag: i32, data: Vec<u8>) -> Result<()> {
        self.check_rank(dest)?;
        self.outboxes[dest]
            .send(Envelope { tag, data })
            .map_err(|_| DiagError::Disconnected { peer: dest })
    }

    fn take(&self, source: usize, tag: i32) -> Result<Vec<u8>> {
        self.check_rank(source)?;
        {
            let mut pending = self.pending.borrow_mut();
            let queue = &mut pending[source];
            if let Some(pos) = queue.iter().position(|env| env.tag == tag) {
                if let Some(env) = queue.remove(pos) {
                    return Ok(env.data);
                }
            }
        }
        loop {
            let env = self.inboxes[source]
                .recv()
                .map_err(|_| DiagError::Disconnected { peer: source })?;
            if env.tag == tag {
                return Ok(env.data);
            }
            tracing::trace!(rank = self.rank, source, tag = env.tag, "parking out-of-order message");
            self.pending.borrow_mut()[source].push_back(env);
        }
    }

    fn take_i32(&self, source: usize, tag: i32) -> Result<i32> {
        let data = self.take(source, tag)?;
        decode_i32(&data)
    }

    fn take_i64(&self, source: usize, tag: i32) -> Result<i64> {
        let data = self.take(source, tag)?;
        let bytes: [u8; 8] = data.as_slice().try_into().map_err(|_| DiagError::PayloadSize {
            expected: 8,
            got: data.len(),
        })?;
        Ok(i64::from_le_bytes(bytes))
    }

    fn others(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&r| r != self.rank)
    }
}

fn decode_i32(data: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = data.try_into().map_err(|_| DiagError::PayloadSize {
        expected: 4,
        got: data.len(),
    })?;
    Ok(i32::from_le_bytes(bytes))
}

fn check_user_tag(tag: i32) -> Result<()> {
    if tag < 0 {
        Err(DiagError::ReservedTag(tag))
    } else {
        Ok(())
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn host(&self) -> &str {
        &self.host
    }

    fn send_i32(&self, value: i32, dest: usize, tag: i32) -> Result<()> {
        check_user_tag(tag)?;
        self.post(dest, tag, value.to_le_bytes().to_vec())
    }

    fn recv_i32(&self, source: usize, tag: i32) -> Result<i32> {
        check_user_tag(tag)?;
        self.take_i32(source, tag)
    }

    fn barrier(&self) -> Result<()> {
        // Rank 0 collects an arrival from everyone, then releases them.
        if self.rank == 0 {
            for peer in self.others() {
                self.take(peer, TAG_BARRIER)?;
            }
            for peer in self.others() {
                self.post(peer, TAG_BARRIER, Vec::new())?;
            }
        } else {
            self.post(0, TAG_BARRIER, Vec::new())?;
            self.take(0, TAG_BARRIER)?;
        }
        Ok(())
    }

    fn broadcast_i32(&self, value: &mut i32, root: usize) -> Result<()> {
        self.check_rank(root)?;
        if self.rank == root {
            for peer in self.others() {
                self.post(peer, TAG_BCAST, value.to_le_bytes().to_vec())?;
            }
        } else {
            *value = self.take_i32(root, TAG_BCAST)?;
        }
        Ok(())
    }

    fn reduce_sum_i64(&self, local: i64, root: usize) -> Result<Option<i64>> {
        self.check_rank(root)?;
        if self.rank != root {
            self.post(root, TAG_REDUCE, local.to_le_bytes().to_vec())?;
            return Ok(None);
        }
        let mut sum = local;
        for peer in self.others() {
            sum = sum.wrapping_add(self.take_i64(peer, TAG_REDUCE)?);
        }
        Ok(Some(sum))
    }

    fn gather_i32(&self, local: i32, root: usize) -> Result<Option<Vec<i32>>> {
        let Some(buf) = self.gather_bytes(&local.to_le_bytes(), root)? else {
            return Ok(None);
        };
        buf.chunks_exact(4).map(decode_i32).collect::<Result<Vec<_>>>().map(Some)
    }

    fn gather_bytes(&self, local: &[u8], root: usize) -> Result<Option<Vec<u8>>> {
        self.check_rank(root)?;
        if self.rank != root {
            self.post(root, TAG_GATHER, local.to_vec())?;
            return Ok(None);
        }
        let width = local.len();
        let mut out = Vec::with_capacity(width * self.size);
        for source in 0..self.size {
            if source == self.rank {
                out.extend_from_slice(local);
                continue;
            }
            let data = self.take(source, TAG_GATHER)?;
            if data.len() != width {
                return Err(DiagError::PayloadSize {
                    expected: width,
                    got: data.len(),
                });
            }
            out.extend_from_slice(&data);
        }
        Ok(Some(out))
    }
}

/// Run `worker` once per rank of an in-process group, each on its own thread.
///
/// Returns the per-rank results indexed by rank. When workers fail, the reported error is
/// the first one that is not a disconnect, since disconnects are usually the peers'
/// reaction to the real fault.
#[cfg(feature = "rayon")]
pub fn run_group<R, F>(hosts: Vec<String>, worker: F) -> Result<Vec<R>>
where
    F: Fn(LocalComm) -> Result<R> + Sync,
    R: Send,
{
    let comms = LocalComm::group(hosts)?;
    let size = comms.len();
    // Every rank blocks in its own thread; one extra thread drives the scope.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(size + 1)
        .thread_name(|i| format!("ringdiag-{i}"))
        .build()
        .map_err(|e| DiagError::Worker(e.to_string()))?;

    let mut slots: Vec<Option<Result<R>>> = (0..size).map(|_| None).collect();
    pool.scope(|s| {
        for (comm, slot) in comms.into_iter().zip(slots.iter_mut()) {
            let worker = &worker;
            s.spawn(move |_| {
                *slot = Some(worker(comm));
            });
        }
    });

    let mut results = Vec::with_capacity(size);
    let mut first_err: Option<DiagError> = None;
    for (rank, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(value)) => results.push(value),
            Some(Err(e)) => {
                let replace = match &first_err {
                    None => true,
                    Some(DiagError::Disconnected { .. }) => {
                        !matches!(e, DiagError::Disconnected { .. })
                    }
                    Some(_) => false,
                };
                if replace {
                    first_err = Some(e);
                }
            }
            None => {
                first_err.get_or_insert(DiagError::Worker(format!(
                    "rank {rank} produced no result"
                )));
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(results),
    }
}
