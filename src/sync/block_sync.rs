//! Parallel block download
//!
//! One slot per reservation. Each slot keeps a peer busy with its outstanding
//! hashes, imports what arrives, and restarts with a new peer when its work is
//! split away or when it is measurably slower than the other slots. A slot
//! finishes once its reservation is stopped.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::network::{ChainAccess, Channel, Connector, SyncMessage};
use crate::primitives::Block;
use crate::sync::checkpoint_queue::CheckpointQueue;
use crate::sync::reservation::DownloadReservation;
use crate::sync::reservation_table::ReservationTable;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Drives one channel for one reservation
pub struct BlockSyncProtocol {
    channel: Box<dyn Channel>,
    table: Arc<ReservationTable>,
    slot: usize,
    expiry_interval: Duration,
}

impl BlockSyncProtocol {
    pub fn new(
        channel: Box<dyn Channel>,
        table: Arc<ReservationTable>,
        slot: usize,
        config: &SyncConfig,
    ) -> Self {
        Self {
            channel,
            table,
            slot,
            expiry_interval: config.expiry_interval(),
        }
    }

    /// Run until the reservation is stopped or the channel must be replaced
    ///
    /// The reservation's rate history is reset on exit unless the channel is
    /// restarting after its work was partitioned.
    pub async fn run(mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let table = Arc::clone(&self.table);
        let Some(reservation) = table.reservation(self.slot) else {
            return Err(SyncError::OperationFailed(format!(
                "unknown block slot ({})",
                self.slot
            )));
        };

        let result = self.synchronize(reservation, cancel).await;

        if result != Err(SyncError::ChannelStopped) {
            reservation.reset();
        }
        if let Err(e) = self.channel.close().await {
            trace!("Error closing channel [{}]: {}", self.channel.peer_addr(), e);
        }
        result
    }

    async fn synchronize(
        &mut self,
        reservation: &DownloadReservation,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let mut timer = interval_at(Instant::now() + self.expiry_interval, self.expiry_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.send_get_blocks(reservation, true).await? {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::ServiceStopped),
                _ = timer.tick() => {
                    if reservation.stopped() {
                        debug!("Stopping complete slot ({}).", self.slot);
                        return Ok(());
                    }
                    if reservation.expired(&self.table) {
                        debug!(
                            "Restarting slow slot ({}) [{}]",
                            self.slot,
                            self.channel.peer_addr()
                        );
                        return Err(SyncError::ChannelTimeout);
                    }
                }
                message = self.channel.recv() => match message? {
                    SyncMessage::Block(block) => {
                        self.import(block).await?;
                        if reservation.toggle_partitioned() {
                            debug!("Restarting partitioned slot ({}).", self.slot);
                            return Err(SyncError::ChannelStopped);
                        }
                        if self.send_get_blocks(reservation, false).await? {
                            return Ok(());
                        }
                    }
                    other => trace!(
                        "Ignoring {} from [{}] during block sync",
                        other.command(),
                        self.channel.peer_addr()
                    ),
                },
            }
        }
    }

    /// Import on the blocking pool, since storage writes may block
    fn import(
        &self,
        block: Arc<Block>,
    ) -> impl std::future::Future<Output = Result<(), SyncError>> + Send + 'static {
        let table = Arc::clone(&self.table);
        let slot = self.slot;
        async move {
            tokio::task::spawn_blocking(move || {
                if let Some(reservation) = table.reservation(slot) {
                    reservation.import(&table, block);
                }
            })
            .await
            .map_err(|e| SyncError::OperationFailed(format!("block import task failed: {}", e)))
        }
    }

    /// Request outstanding blocks; Ok(true) when the reservation is finished
    async fn send_get_blocks(
        &mut self,
        reservation: &DownloadReservation,
        reset: bool,
    ) -> Result<bool, SyncError> {
        if reservation.stopped() {
            debug!("Stopping complete slot ({}).", self.slot);
            return Ok(true);
        }

        let request = reservation.request(reset);
        if request.is_empty() {
            return Ok(false);
        }

        debug!(
            "Sending request of {} hashes for slot ({}).",
            request.len(),
            self.slot
        );
        self.channel.send(SyncMessage::GetData(request)).await?;
        Ok(false)
    }
}

/// Downloads every queued block across a table of reservations
pub struct BlockSyncSession {
    config: SyncConfig,
    table: Arc<ReservationTable>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
}

impl BlockSyncSession {
    /// Allocate the ready work in `hashes` across up to `config.sync_peers` slots
    pub fn new(
        config: SyncConfig,
        hashes: Arc<CheckpointQueue>,
        chain: Arc<dyn ChainAccess>,
        connector: Arc<dyn Connector>,
        cancel: CancellationToken,
    ) -> Self {
        let table = Arc::new(ReservationTable::new(hashes, chain, &config));
        Self {
            config,
            table,
            connector,
            cancel,
        }
    }

    pub fn table(&self) -> &Arc<ReservationTable> {
        &self.table
    }

    /// Stop all slots; idempotent
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run every block slot to completion
    pub async fn start(self: Arc<Self>) -> Result<(), SyncError> {
        let slots = self.table.table();
        if slots.is_empty() {
            let unallocated = self.table.remaining();
            if unallocated > 0 {
                error!("No block slots for {} queued blocks.", unallocated);
                return Err(SyncError::OperationFailed(format!(
                    "{} blocks queued without download slots",
                    unallocated
                )));
            }
            info!("No blocks to download.");
            return Ok(());
        }

        info!(
            "Getting {} blocks with {} slots.",
            self.table.remaining(),
            slots.len()
        );

        let regulator = self.cancel.child_token();
        let monitor = tokio::spawn(Arc::clone(&self).regulate(regulator.clone()));

        let mut tasks = JoinSet::new();
        for slot in slots {
            tasks.spawn(Arc::clone(&self).synchronize_slot(slot));
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                error!("Block slot task failed: {}", e);
                Err(SyncError::OperationFailed(e.to_string()))
            });
            if let Err(e) = outcome {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        regulator.cancel();
        if let Err(e) = monitor.await {
            error!("Block sync regulator failed: {}", e);
        }

        if result.is_ok() {
            info!("Completed block sync.");
        }
        result
    }

    async fn synchronize_slot(self: Arc<Self>, slot: usize) -> Result<(), SyncError> {
        loop {
            if self.stopped() {
                debug!("Suspending block slot ({}).", slot);
                return Err(SyncError::ServiceStopped);
            }

            // Work may have been split away entirely while disconnected
            if self
                .table
                .reservation(slot)
                .map_or(true, DownloadReservation::stopped)
            {
                self.handle_complete(slot);
                return Ok(());
            }

            debug!("Starting block slot ({}).", slot);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => continue,
                connected = self.connector.connect() => connected,
            };

            let mut channel = match connected {
                Ok(channel) => channel,
                Err(e) => {
                    debug!("Failure connecting block slot ({}) {}", slot, e);
                    self.pause().await;
                    continue;
                }
            };

            if channel.version() < self.config.protocol_minimum {
                debug!(
                    "Channel stopped on block slot ({}) {}",
                    slot,
                    SyncError::VersionTooLow {
                        negotiated: channel.version(),
                        minimum: self.config.protocol_minimum,
                    }
                );
                if let Err(e) = channel.close().await {
                    trace!("Error closing channel [{}]: {}", channel.peer_addr(), e);
                }
                self.pause().await;
                continue;
            }

            debug!("Connected block slot ({}) [{}]", slot, channel.peer_addr());
            let protocol =
                BlockSyncProtocol::new(channel, Arc::clone(&self.table), slot, &self.config);

            match protocol.run(&self.cancel).await {
                Ok(()) => {
                    self.handle_complete(slot);
                    return Ok(());
                }
                Err(e) if e.is_shutdown() => continue,
                Err(e) => debug!("Channel stopped on block slot ({}) {}", slot, e),
            }
        }
    }

    fn handle_complete(&self, slot: usize) {
        self.table.remove(slot);
        debug!("Completed block slot ({}).", slot);
    }

    /// Periodic progress report while slots run
    async fn regulate(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.regulator_interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = timer.tick() => {
                    let statistics = self.table.rates();
                    info!(
                        "Block sync: {} blocks remaining in {} slots, {} active, mean {:.2} blocks/sec, deviation {:.2}",
                        self.table.remaining(),
                        self.table.len(),
                        statistics.active_count,
                        statistics.arithmetic_mean * 1e6,
                        statistics.standard_deviation * 1e6
                    );
                }
            }
        }
    }

    async fn pause(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
        }
    }
}
