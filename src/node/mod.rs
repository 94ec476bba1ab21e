//! Sync orchestration
//!
//! Runs header sync over the configured checkpoint ranges, then downloads the
//! discovered blocks. Both phases share one [`CheckpointQueue`] and one
//! cancellation token, so [`SyncNode::stop`] unwinds whichever phase is active.

use crate::config::NodeConfig;
use crate::network::{ChainAccess, Connector};
use crate::sync::{BlockSyncSession, CheckpointQueue, HeaderSyncSession};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Catch-up synchronizer for one chain
pub struct SyncNode {
    config: NodeConfig,
    chain: Arc<dyn ChainAccess>,
    connector: Arc<dyn Connector>,
    hashes: Arc<CheckpointQueue>,
    cancel: CancellationToken,
}

impl SyncNode {
    /// Create a synchronizer; fails on invalid configuration
    pub fn new(
        config: NodeConfig,
        chain: Arc<dyn ChainAccess>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate().context("Invalid sync configuration")?;
        Ok(Self {
            config,
            chain,
            connector,
            hashes: Arc::new(CheckpointQueue::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Work queue shared by both phases
    pub fn hashes(&self) -> &Arc<CheckpointQueue> {
        &self.hashes
    }

    /// Stop synchronization; idempotent
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping synchronization.");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Synchronize headers then blocks up to the last checkpoint
    pub async fn synchronize(&self) -> Result<()> {
        let checkpoints = self.config.checkpoints()?;
        let start_height = self
            .chain
            .last_height()
            .context("Failed to read chain height")?;
        info!(
            "Starting synchronization from #{} with {} checkpoints.",
            start_height,
            checkpoints.len()
        );

        let headers = Arc::new(HeaderSyncSession::new(
            self.config.sync.clone(),
            Arc::clone(&self.hashes),
            Arc::clone(&self.chain),
            Arc::clone(&self.connector),
            checkpoints,
            self.cancel.child_token(),
        ));
        headers
            .start()
            .await
            .context("Header synchronization failed")?;

        let blocks = Arc::new(BlockSyncSession::new(
            self.config.sync.clone(),
            Arc::clone(&self.hashes),
            Arc::clone(&self.chain),
            Arc::clone(&self.connector),
            self.cancel.child_token(),
        ));
        blocks
            .start()
            .await
            .context("Block synchronization failed")?;

        let end_height = self
            .chain
            .last_height()
            .context("Failed to read chain height")?;
        info!("Synchronized from #{} to #{}.", start_height, end_height);
        Ok(())
    }
}
