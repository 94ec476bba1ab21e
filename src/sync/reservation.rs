//! Per-connection block download reservation
//!
//! A reservation is one slot's share of outstanding block work plus a sliding
//! window of import timings. Outstanding work and rate history sit behind
//! separate locks so a rate read from the table never waits on an import in
//! another slot.

use crate::network::protocol::{GetDataMessage, InventoryItem};
use crate::primitives::{encode_hash, Block, Hash};
use crate::sync::performance::{PerformanceEstimate, RateStatistics};
use crate::sync::reservation_table::ReservationTable;
use crate::utils::time::as_micros;
use crate::utils::{read_lock, write_lock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Standard deviations below the mean a rate may fall before it expires
pub const MULTIPLE: f64 = 1.01;

/// Import records required before a rate is computed
pub const MINIMUM_HISTORY: usize = 3;

#[derive(Debug, Default)]
struct Outstanding {
    hashes: HashMap<Hash, u64>,
    heights: BTreeMap<u64, Hash>,
    /// Contents changed since the last request was built
    pending: bool,
    /// Gave work away; the in-flight request is stale
    partitioned: bool,
    /// No more work will ever be supplied
    stopped: bool,
}

impl Outstanding {
    fn insert(&mut self, hash: Hash, height: u64) {
        self.hashes.insert(hash, height);
        self.heights.insert(height, hash);
        self.pending = true;
    }
}

#[derive(Debug, Clone, Copy)]
struct ImportRecord {
    events: usize,
    database: u64,
    time: Instant,
}

#[derive(Debug)]
struct RateHistory {
    records: VecDeque<ImportRecord>,
    rate: PerformanceEstimate,
}

/// One slot's outstanding block work and import rate
#[derive(Debug)]
pub struct DownloadReservation {
    slot: usize,
    rate_window: Duration,
    work: RwLock<Outstanding>,
    history: RwLock<RateHistory>,
}

impl DownloadReservation {
    pub fn new(slot: usize, rate_window: Duration) -> Self {
        Self {
            slot,
            rate_window,
            work: RwLock::new(Outstanding::default()),
            history: RwLock::new(RateHistory {
                records: VecDeque::new(),
                rate: PerformanceEstimate::idle(),
            }),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn rate_window(&self) -> Duration {
        self.rate_window
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.work).heights.is_empty()
    }

    /// Outstanding block count
    pub fn len(&self) -> usize {
        read_lock(&self.work).heights.len()
    }

    pub fn stopped(&self) -> bool {
        read_lock(&self.work).stopped
    }

    pub fn pending(&self) -> bool {
        read_lock(&self.work).pending
    }

    /// Outstanding (hash, height) pairs by ascending height
    pub fn outstanding(&self) -> Vec<(Hash, u64)> {
        read_lock(&self.work)
            .heights
            .iter()
            .map(|(height, hash)| (*hash, *height))
            .collect()
    }

    // Rate
    // ------------------------------------------------------------------------

    pub fn idle(&self) -> bool {
        read_lock(&self.history).rate.idle
    }

    pub fn rate(&self) -> PerformanceEstimate {
        read_lock(&self.history).rate
    }

    pub fn set_rate(&self, rate: PerformanceEstimate) {
        write_lock(&self.history).rate = rate;
    }

    /// Forget rate history, as when a new channel takes over the slot
    pub fn reset(&self) {
        let mut history = write_lock(&self.history);
        history.records.clear();
        history.rate = PerformanceEstimate::idle();
    }

    /// True when this slot is a slow outlier against `table`
    pub fn expired(&self, table: &ReservationTable) -> bool {
        self.expired_against(&table.rates())
    }

    /// One-sided outlier test: below the mean by more than `MULTIPLE` deviations
    pub fn expired_against(&self, statistics: &RateStatistics) -> bool {
        let normal = self.rate().normal();
        let deviation = normal - statistics.arithmetic_mean;
        let allowed = MULTIPLE * statistics.standard_deviation;
        let expired = deviation < 0.0 && deviation.abs() > allowed;

        if expired {
            debug!(
                "Slot ({}) rate [{:.4}] below mean [{:.4}] by more than [{:.4}] over {} slots",
                self.slot,
                normal * 1e6,
                statistics.arithmetic_mean * 1e6,
                allowed * 1e6,
                statistics.active_count
            );
        }
        expired
    }

    /// Record `events` imports that spent `database` in storage, ending at `now`
    pub fn update_rate(&self, events: usize, database: Duration, now: Instant) {
        let mut history = write_lock(&self.history);

        let event_start = now.checked_sub(database).unwrap_or(now);
        let before = history.records.len();
        if let Some(start) = now.checked_sub(self.rate_window) {
            history.records.retain(|record| record.time >= start);
        }
        let window_full = history.records.len() < before;

        history.records.push_back(ImportRecord {
            events,
            database: as_micros(database),
            time: event_start,
        });

        if history.records.len() < MINIMUM_HISTORY {
            history.rate = PerformanceEstimate::idle();
            return;
        }

        let (events, database) = history
            .records
            .iter()
            .fold((0usize, 0u64), |(events, database), record| {
                (
                    events.saturating_add(record.events),
                    database.saturating_add(record.database),
                )
            });

        let window = if window_full {
            self.rate_window
        } else {
            let oldest = history
                .records
                .iter()
                .map(|record| record.time)
                .min()
                .unwrap_or(event_start);
            now.saturating_duration_since(oldest)
        };

        history.rate = PerformanceEstimate {
            idle: false,
            events,
            database,
            window: as_micros(window),
        };
    }

    // Work
    // ------------------------------------------------------------------------

    /// Build a block request for everything outstanding
    ///
    /// A new channel always gets the full list (and a fresh rate history). An
    /// existing channel only gets a request when the contents changed.
    pub fn request(&self, new_channel: bool) -> GetDataMessage {
        if new_channel {
            self.reset();
        }

        let mut work = write_lock(&self.work);
        if !new_channel && !work.pending {
            return GetDataMessage::default();
        }

        let inventory = work
            .heights
            .values()
            .map(|hash| InventoryItem::block(*hash))
            .collect();
        work.pending = false;
        GetDataMessage { inventory }
    }

    pub fn insert(&self, hash: Hash, height: u64) {
        write_lock(&self.work).insert(hash, height);
    }

    /// Store a block this slot asked for, then refill if it ran dry
    pub fn import(&self, table: &ReservationTable, block: Arc<Block>) {
        let hash = block.hash();
        let encoded = encode_hash(&hash);

        let height = match self.take(&hash) {
            Some(height) => height,
            None => {
                debug!("Ignoring unsolicited block ({}) [{}]", self.slot, encoded);
                return;
            }
        };

        let started = Instant::now();
        let stored = table.import(block, height);
        let cost = started.elapsed();

        if stored {
            self.update_rate(1, cost, Instant::now());
            let rate = self.rate();
            info!(
                "Imported block #{:06} ({:02}) [{}] {:06.2} {:05.2}%",
                height,
                self.slot,
                encoded,
                rate.total() * 1e6,
                rate.ratio() * 100.0
            );
        } else {
            debug!(
                "Failed to import block #{:06} ({:02}) [{}]",
                height, self.slot, encoded
            );
        }

        self.populate(table);
    }

    /// Ask the table for more work once empty; stop for good if there is none
    pub fn populate(&self, table: &ReservationTable) {
        {
            let work = read_lock(&self.work);
            if work.stopped || !work.heights.is_empty() {
                return;
            }
        }

        if !table.populate(self.slot) {
            write_lock(&self.work).stopped = true;
            debug!("No more work for slot ({}).", self.slot);
        }
    }

    /// Read and clear the partitioned flag; a set flag marks the request pending
    pub fn toggle_partitioned(&self) -> bool {
        let mut work = write_lock(&self.work);
        if !work.partitioned {
            return false;
        }
        work.partitioned = false;
        work.pending = true;
        true
    }

    /// Move the lower half (rounded up) of this slot's work into an empty `target`
    ///
    /// Returns whether `target` holds work afterwards.
    pub fn partition(&self, target: &DownloadReservation) -> bool {
        if self.slot == target.slot {
            return !self.is_empty();
        }

        let (mut donor, mut minimal) = self.lock_pair(target);
        if !minimal.heights.is_empty() {
            return true;
        }

        let offset = (donor.heights.len() + 1) / 2;
        let moved: Vec<(u64, Hash)> = donor
            .heights
            .iter()
            .take(offset)
            .map(|(height, hash)| (*height, *hash))
            .collect();

        for (height, hash) in &moved {
            donor.heights.remove(height);
            donor.hashes.remove(hash);
            minimal.hashes.insert(*hash, *height);
            minimal.heights.insert(*height, *hash);
        }

        let populated = !minimal.heights.is_empty();
        donor.partitioned = !donor.heights.is_empty();
        if donor.heights.is_empty() {
            donor.stopped = true;
        }
        minimal.pending = populated;

        debug!(
            "Moved [{}] blocks from slot ({}) to ({}) leaving [{}].",
            moved.len(),
            self.slot,
            target.slot,
            donor.heights.len()
        );
        populated
    }

    fn take(&self, hash: &Hash) -> Option<u64> {
        let mut work = write_lock(&self.work);
        let height = work.hashes.remove(hash)?;
        work.heights.remove(&height);
        Some(height)
    }

    /// Lock this slot and `other` in ascending slot order
    fn lock_pair<'a>(
        &'a self,
        other: &'a DownloadReservation,
    ) -> (
        RwLockWriteGuard<'a, Outstanding>,
        RwLockWriteGuard<'a, Outstanding>,
    ) {
        if self.slot < other.slot {
            let mine = write_lock(&self.work);
            let theirs = write_lock(&other.work);
            (mine, theirs)
        } else {
            let theirs = write_lock(&other.work);
            let mine = write_lock(&self.work);
            (mine, theirs)
        }
    }
}
