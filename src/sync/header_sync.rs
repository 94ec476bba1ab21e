//! Header-first synchronization
//!
//! One slot per pair of consecutive checkpoints. Each slot connects to a peer,
//! walks `getheaders` from the tail of its [`HeaderChain`] to the stop
//! checkpoint, and reconnects on any failure. The minimum acceptable header
//! rate is shared by all slots and relaxes after every failed attempt.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::network::protocol::{HEADERS_VERSION, MAX_HEADERS_RESULTS};
use crate::network::{
    ChainAccess, Channel, Connector, GetHeadersMessage, HeadersMessage, SyncMessage,
};
use crate::primitives::Checkpoint;
use crate::sync::checkpoint_queue::CheckpointQueue;
use crate::sync::header_chain::HeaderChain;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Drives one channel until its header range completes or the attempt fails
pub struct HeaderSyncProtocol {
    channel: Box<dyn Channel>,
    headers: Arc<HeaderChain>,
    minimum_rate: u32,
    expiry_interval: Duration,
    version: u32,
}

impl HeaderSyncProtocol {
    pub fn new(
        channel: Box<dyn Channel>,
        headers: Arc<HeaderChain>,
        minimum_rate: u32,
        config: &SyncConfig,
    ) -> Self {
        Self {
            channel,
            headers,
            minimum_rate,
            expiry_interval: config.expiry_interval(),
            version: config.protocol_maximum,
        }
    }

    /// Run to completion; the channel is closed on every exit path
    pub async fn run(mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let result = self.synchronize(cancel).await;
        if let Err(e) = self.channel.close().await {
            trace!("Error closing channel [{}]: {}", self.channel.peer_addr(), e);
        }
        result
    }

    async fn synchronize(&mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        if self.headers.complete() {
            return Ok(());
        }

        let start_height = self.headers.previous_height();
        let mut elapsed = Duration::ZERO;
        let mut timer = interval_at(Instant::now() + self.expiry_interval, self.expiry_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.send_get_headers().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::ServiceStopped),
                _ = timer.tick() => {
                    elapsed += self.expiry_interval;
                    self.check_rate(start_height, elapsed)?;
                }
                message = self.channel.recv() => match message? {
                    SyncMessage::Headers(message) => {
                        if self.handle_headers(message)? {
                            return Ok(());
                        }
                        self.send_get_headers().await?;
                    }
                    other => trace!(
                        "Ignoring {} from [{}] during header sync",
                        other.command(),
                        self.channel.peer_addr()
                    ),
                },
            }
        }
    }

    async fn send_get_headers(&mut self) -> Result<(), SyncError> {
        let request = GetHeadersMessage {
            version: self.version,
            block_locator_hashes: vec![self.headers.previous_hash()],
            hash_stop: self.headers.stop_hash(),
        };
        self.channel.send(SyncMessage::GetHeaders(request)).await
    }

    /// Merge a batch; Ok(true) once the range is complete
    fn handle_headers(&self, message: HeadersMessage) -> Result<bool, SyncError> {
        let peer = self.channel.peer_addr();
        let first = self.headers.previous_height() + 1;
        let count = message.headers.len();

        if !self.headers.merge(&message.headers) {
            warn!("Failure merging headers from [{}]", peer);
            return Err(SyncError::InvalidPreviousBlock);
        }

        let last = self.headers.previous_height();
        if last >= first {
            info!("Synced headers {}-{} from [{}]", first, last, peer);
        }

        if self.headers.complete() {
            return Ok(true);
        }

        // A full batch means the peer has more; anything less and it is out
        if count < MAX_HEADERS_RESULTS {
            debug!(
                "Peer [{}] exhausted at height {} of {}",
                peer,
                last,
                self.headers.stop().height
            );
            return Err(SyncError::OperationFailed("peer exhausted".to_string()));
        }
        Ok(false)
    }

    fn check_rate(&self, start_height: u64, elapsed: Duration) -> Result<(), SyncError> {
        let gained = self.headers.previous_height().saturating_sub(start_height);
        let rate = gained / elapsed.as_secs().max(1);

        if rate < u64::from(self.minimum_rate) {
            debug!(
                "Header sync rate ({}/sec) from [{}] below minimum ({}/sec)",
                rate,
                self.channel.peer_addr(),
                self.minimum_rate
            );
            return Err(SyncError::ChannelTimeout);
        }
        Ok(())
    }
}

/// Fills every checkpoint range with headers and seeds the block queue
pub struct HeaderSyncSession {
    config: SyncConfig,
    hashes: Arc<CheckpointQueue>,
    chain: Arc<dyn ChainAccess>,
    connector: Arc<dyn Connector>,
    checkpoints: Vec<Checkpoint>,
    minimum_rate: AtomicU32,
    cancel: CancellationToken,
}

impl HeaderSyncSession {
    pub fn new(
        config: SyncConfig,
        hashes: Arc<CheckpointQueue>,
        chain: Arc<dyn ChainAccess>,
        connector: Arc<dyn Connector>,
        mut checkpoints: Vec<Checkpoint>,
        cancel: CancellationToken,
    ) -> Self {
        Checkpoint::sort(&mut checkpoints);
        Self {
            minimum_rate: AtomicU32::new(config.minimum_header_rate),
            config,
            hashes,
            chain,
            connector,
            checkpoints,
            cancel,
        }
    }

    /// Current headers/second floor
    pub fn minimum_rate(&self) -> u32 {
        self.minimum_rate.load(Ordering::Relaxed)
    }

    /// Stop all slots; idempotent
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run every header slot to completion
    pub async fn start(self: Arc<Self>) -> Result<(), SyncError> {
        let rows = self.initialize()?;
        if rows.is_empty() {
            info!("Headers already synchronized to the last checkpoint.");
            return Ok(());
        }

        info!("Getting headers for {} checkpoint ranges.", rows.len());

        let mut slots = JoinSet::new();
        for row in rows {
            slots.spawn(Arc::clone(&self).synchronize_slot(row));
        }

        let mut result = Ok(());
        while let Some(joined) = slots.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                error!("Header slot task failed: {}", e);
                Err(SyncError::OperationFailed(e.to_string()))
            });
            if let Err(e) = outcome {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        if result.is_ok() {
            info!("Completed header sync.");
        }
        result
    }

    /// Build one header chain per checkpoint range above the stored chain
    ///
    /// Reserves in the queue every height the ranges will discover that is not
    /// already stored.
    pub fn initialize(&self) -> Result<Vec<Arc<HeaderChain>>, SyncError> {
        if !self.hashes.is_empty() {
            error!("Block hash list must not be initialized.");
            return Err(SyncError::OperationFailed(
                "block hash list already initialized".to_string(),
            ));
        }

        if self.checkpoints.len() < 2 {
            return Err(SyncError::Config(
                "header sync requires at least two checkpoints".to_string(),
            ));
        }

        let last_height = self
            .chain
            .last_height()
            .map_err(|e| SyncError::OperationFailed(format!("chain height unavailable: {}", e)))?;

        let mut rows = Vec::new();
        let mut heights = Vec::new();
        for pair in self.checkpoints.windows(2) {
            let (start, stop) = (pair[0], pair[1]);
            if stop.height <= last_height {
                continue;
            }

            let row = HeaderChain::new(rows.len(), start, stop);
            heights.extend(row.first_height().max(last_height + 1)..=stop.height);
            rows.push(Arc::new(row));
        }

        self.hashes.reserve(heights);
        debug!(
            "Reserved {} heights above #{} across {} header slots.",
            self.hashes.len(),
            last_height,
            rows.len()
        );
        Ok(rows)
    }

    async fn synchronize_slot(self: Arc<Self>, row: Arc<HeaderChain>) -> Result<(), SyncError> {
        let slot = row.slot();
        loop {
            if self.stopped() {
                debug!("Suspending header slot ({}).", slot);
                return Err(SyncError::ServiceStopped);
            }

            debug!("Starting header slot ({}).", slot);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => continue,
                connected = self.connector.connect() => connected,
            };

            let mut channel = match connected {
                Ok(channel) => channel,
                Err(e) => {
                    debug!("Failure connecting header slot ({}) {}", slot, e);
                    self.pause().await;
                    continue;
                }
            };

            let peer = channel.peer_addr();
            if channel.version() < HEADERS_VERSION {
                let e = SyncError::VersionTooLow {
                    negotiated: channel.version(),
                    minimum: HEADERS_VERSION,
                };
                if let Err(close_error) = channel.close().await {
                    trace!("Error closing channel [{}]: {}", peer, close_error);
                }
                self.handle_failure(slot, &e);
                continue;
            }

            debug!("Connected header slot ({}) [{}]", slot, peer);
            let protocol = HeaderSyncProtocol::new(
                channel,
                Arc::clone(&row),
                self.minimum_rate(),
                &self.config,
            );

            match protocol.run(&self.cancel).await {
                Ok(()) => {
                    self.handle_complete(&row);
                    return Ok(());
                }
                Err(e) if e.is_shutdown() => continue,
                Err(e) => self.handle_failure(slot, &e),
            }
        }
    }

    fn handle_failure(&self, slot: usize, error: &SyncError) {
        let back_off = self.config.header_rate_back_off;
        let previous = self
            .minimum_rate
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |rate| {
                Some((rate as f32 * back_off) as u32)
            })
            .unwrap_or_else(|rate| rate);

        debug!(
            "Channel stopped on header slot ({}) {}; minimum rate {} -> {}",
            slot,
            error,
            previous,
            self.minimum_rate()
        );
    }

    fn handle_complete(&self, row: &HeaderChain) {
        let mut height = row.first_height();
        let mut enqueued = 0usize;
        for header in row.headers() {
            if self.hashes.enqueue(header.hash(), height) {
                enqueued += 1;
            }
            height += 1;
        }

        info!(
            "Completed header slot ({}) {}-{}, {} blocks queued.",
            row.slot(),
            row.first_height(),
            row.stop().height,
            enqueued
        );
    }

    async fn pause(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
        }
    }
}
