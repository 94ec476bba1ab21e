//! Height to hash work pool
//!
//! Header sync reserves the heights it expects to discover and fills them in
//! as header ranges complete. Block sync drains filled entries in ascending
//! height order into download reservations. Reserved heights that are never
//! filled (already stored, or never discovered) are never handed out.

use crate::primitives::Hash;
use crate::utils::{read_lock, write_lock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Entries {
    /// Reserved heights still waiting for a hash
    unfilled: BTreeSet<u64>,
    /// Heights with a known hash, ready to be dequeued
    filled: BTreeMap<u64, Hash>,
}

/// Thread-safe height to hash queue shared by header and block sync
#[derive(Debug, Default)]
pub struct CheckpointQueue {
    entries: RwLock<Entries>,
}

impl CheckpointQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no reserved or filled entries remain
    pub fn is_empty(&self) -> bool {
        let entries = read_lock(&self.entries);
        entries.unfilled.is_empty() && entries.filled.is_empty()
    }

    /// Count of all entries, filled or not
    pub fn len(&self) -> usize {
        let entries = read_lock(&self.entries);
        entries.unfilled.len() + entries.filled.len()
    }

    /// Count of entries that can be dequeued
    pub fn ready(&self) -> usize {
        read_lock(&self.entries).filled.len()
    }

    /// Replace all entries with one unfilled entry per height
    pub fn reserve<I>(&self, heights: I)
    where
        I: IntoIterator<Item = u64>,
    {
        let mut entries = write_lock(&self.entries);
        entries.filled.clear();
        entries.unfilled = heights.into_iter().collect();
    }

    /// Fill a reserved height
    ///
    /// Returns false (and changes nothing) when the height was not reserved or
    /// already filled.
    pub fn enqueue(&self, hash: Hash, height: u64) -> bool {
        let mut entries = write_lock(&self.entries);
        if !entries.unfilled.remove(&height) {
            return false;
        }
        entries.filled.insert(height, hash);
        true
    }

    /// Remove and return the lowest filled entry
    pub fn dequeue(&self) -> Option<(Hash, u64)> {
        write_lock(&self.entries)
            .filled
            .pop_first()
            .map(|(height, hash)| (hash, height))
    }
}
