//! Link-validating header accumulator for one checkpoint range
//!
//! Headers are accepted in order from `start` (exclusive) to `stop`
//! (inclusive). A batch that fails any check discards everything accumulated
//! so far and the slot starts over from `start` with the next peer.

use crate::primitives::{BlockHeader, Checkpoint, Hash};
use crate::utils::{read_lock, write_lock};
use std::sync::RwLock;

/// Headers between two checkpoints, filled by one header sync slot
#[derive(Debug)]
pub struct HeaderChain {
    slot: usize,
    start: Checkpoint,
    stop: Checkpoint,
    capacity: usize,
    list: RwLock<Vec<BlockHeader>>,
}

impl HeaderChain {
    /// `stop` must be above `start`; an inverted range has no capacity
    pub fn new(slot: usize, start: Checkpoint, stop: Checkpoint) -> Self {
        let capacity = stop.height.saturating_sub(start.height) as usize;
        Self {
            slot,
            start,
            stop,
            capacity,
            list: RwLock::new(Vec::with_capacity(capacity.min(100_000))),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn start(&self) -> Checkpoint {
        self.start
    }

    pub fn stop(&self) -> Checkpoint {
        self.stop
    }

    /// Height of the first header in the range
    pub fn first_height(&self) -> u64 {
        self.start.height + 1
    }

    pub fn stop_hash(&self) -> Hash {
        self.stop.hash
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the range up to and including `stop` is filled
    pub fn complete(&self) -> bool {
        self.remaining() == 0
    }

    pub fn len(&self) -> usize {
        read_lock(&self.list).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.list).is_empty()
    }

    /// Headers still needed to reach `stop`
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Hash of the last accepted header, or the start checkpoint
    pub fn previous_hash(&self) -> Hash {
        read_lock(&self.list)
            .last()
            .map(BlockHeader::hash)
            .unwrap_or(self.start.hash)
    }

    /// Height of the last accepted header, or the start checkpoint
    pub fn previous_height(&self) -> u64 {
        self.start.height + self.len() as u64
    }

    /// Snapshot of accepted headers
    pub fn headers(&self) -> Vec<BlockHeader> {
        read_lock(&self.list).clone()
    }

    /// Append as much of `headers` as fits
    ///
    /// On the first header that fails link, check or accept, the whole list is
    /// cleared and false is returned.
    pub fn merge(&self, headers: &[BlockHeader]) -> bool {
        let mut list = write_lock(&self.list);
        let count = self.capacity.saturating_sub(list.len()).min(headers.len());

        for header in &headers[..count] {
            let hash = header.hash();
            let previous = list.last().map(BlockHeader::hash).unwrap_or(self.start.hash);
            let remaining = self.capacity - list.len();

            let linked = header.prev_block_hash == previous;
            // The final slot in the range only accepts the stop checkpoint
            let accepted = remaining > 1 || hash == self.stop.hash;

            if !linked || !header.check() || !accepted {
                list.clear();
                return false;
            }
            list.push(*header);
        }
        true
    }
}
