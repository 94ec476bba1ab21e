//! Table of block download reservations
//!
//! Reservations live in a fixed arena indexed by slot for the lifetime of the
//! table; membership decides which of them take part in rate statistics and
//! rebalancing. Rebalancing runs entirely under the table's membership write
//! lock. Reservation locks are only ever taken inside it, donor and target in
//! ascending slot order.

use crate::config::SyncConfig;
use crate::network::ChainAccess;
use crate::primitives::Block;
use crate::sync::checkpoint_queue::CheckpointQueue;
use crate::sync::performance::RateStatistics;
use crate::sync::reservation::DownloadReservation;
use crate::utils::{read_lock, write_lock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// All block download reservations of one block sync session
pub struct ReservationTable {
    hashes: Arc<CheckpointQueue>,
    chain: Arc<dyn ChainAccess>,
    arena: Vec<DownloadReservation>,
    members: RwLock<Vec<usize>>,
    max_request: AtomicUsize,
}

impl ReservationTable {
    /// Build up to `config.sync_peers` reservations and deal out the ready work
    pub fn new(
        hashes: Arc<CheckpointQueue>,
        chain: Arc<dyn ChainAccess>,
        config: &SyncConfig,
    ) -> Self {
        Self::with_connections(
            hashes,
            chain,
            config.sync_peers,
            config.rate_window(),
            config.max_request,
        )
    }

    pub fn with_connections(
        hashes: Arc<CheckpointQueue>,
        chain: Arc<dyn ChainAccess>,
        connections: usize,
        rate_window: Duration,
        max_request: usize,
    ) -> Self {
        let max_request = max_request.max(1);
        let blocks = hashes.ready();
        let rows = connections.min(usize::MAX / max_request).min(blocks);

        let arena: Vec<DownloadReservation> = (0..rows)
            .map(|slot| DownloadReservation::new(slot, rate_window))
            .collect();

        if rows > 0 {
            let allocation = blocks.min(rows * max_request);
            // Round robin in ascending height order; the remainder stays queued
            'deal: for _ in 0..allocation / rows {
                for reservation in &arena {
                    match hashes.dequeue() {
                        Some((hash, height)) => reservation.insert(hash, height),
                        None => break 'deal,
                    }
                }
            }
            debug!(
                "Reserved {} of {} blocks to {} slots.",
                (allocation / rows) * rows,
                blocks,
                rows
            );
        }

        Self {
            hashes,
            chain,
            members: RwLock::new((0..rows).collect()),
            arena,
            max_request: AtomicUsize::new(max_request),
        }
    }

    pub fn max_request(&self) -> usize {
        self.max_request.load(Ordering::Relaxed)
    }

    pub fn set_max_request(&self, max_request: usize) {
        self.max_request.store(max_request.max(1), Ordering::Relaxed);
    }

    /// Slots currently in the table
    pub fn table(&self) -> Vec<usize> {
        read_lock(&self.members).clone()
    }

    /// Number of member reservations
    pub fn len(&self) -> usize {
        read_lock(&self.members).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.members).is_empty()
    }

    pub fn reservation(&self, slot: usize) -> Option<&DownloadReservation> {
        self.arena.get(slot)
    }

    /// Blocks still to download: outstanding in members plus ready in the queue
    pub fn remaining(&self) -> usize {
        let members = read_lock(&self.members);
        let outstanding: usize = members
            .iter()
            .filter_map(|slot| self.arena.get(*slot))
            .map(DownloadReservation::len)
            .sum();
        outstanding + self.hashes.ready()
    }

    /// Mean and deviation of the normal rates of non-idle members
    pub fn rates(&self) -> RateStatistics {
        let members = read_lock(&self.members);
        let rates: Vec<f64> = members
            .iter()
            .filter_map(|slot| self.arena.get(*slot))
            .map(DownloadReservation::rate)
            .filter(|rate| !rate.idle)
            .map(|rate| rate.normal())
            .collect();
        RateStatistics::from_rates(&rates)
    }

    /// Refill an empty slot from the queue, or else split the largest member
    ///
    /// Returns whether the slot holds work afterwards.
    pub fn populate(&self, slot: usize) -> bool {
        let members = write_lock(&self.members);
        let Some(minimal) = self.arena.get(slot) else {
            return false;
        };

        let populated = self.reserve(minimal) || self.partition(&members, minimal);
        drop(members);

        if populated {
            debug!("Populated {} blocks to slot ({}).", minimal.len(), slot);
        }
        populated
    }

    /// Take a slot out of rebalancing once its channel finished
    pub fn remove(&self, slot: usize) {
        let mut members = write_lock(&self.members);
        let before = members.len();
        members.retain(|member| *member != slot);

        if members.len() < before {
            if let Some(reservation) = self.arena.get(slot) {
                if !reservation.is_empty() {
                    warn!(
                        "Removed slot ({}) with {} blocks outstanding.",
                        slot,
                        reservation.len()
                    );
                }
            }
        }
    }

    /// Hand a block to storage; false when the chain rejects it
    pub fn import(&self, block: Arc<Block>, height: u64) -> bool {
        match self.chain.insert(block, height) {
            Ok(()) => true,
            Err(e) => {
                warn!("Chain rejected block #{}: {}", height, e);
                false
            }
        }
    }

    fn reserve(&self, minimal: &DownloadReservation) -> bool {
        if !minimal.is_empty() {
            return true;
        }

        let allocation = self.hashes.ready().min(self.max_request());
        for _ in 0..allocation {
            match self.hashes.dequeue() {
                Some((hash, height)) => minimal.insert(hash, height),
                None => break,
            }
        }
        !minimal.is_empty()
    }

    fn partition(&self, members: &[usize], minimal: &DownloadReservation) -> bool {
        // First member with the largest outstanding count wins ties
        let mut maximal: Option<&DownloadReservation> = None;
        for reservation in members.iter().filter_map(|slot| self.arena.get(*slot)) {
            if maximal.map_or(true, |current| reservation.len() > current.len()) {
                maximal = Some(reservation);
            }
        }

        match maximal {
            Some(maximal) if maximal.slot() != minimal.slot() => maximal.partition(minimal),
            _ => false,
        }
    }
}
